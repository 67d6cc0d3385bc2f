use std::io;

use chat_coordinator::{bind_socket, CoordinatorConfig, CoordinatorService};
use chat_sync::{init_logging, EnvConfig};

#[tokio::main]
async fn main() -> io::Result<()> {
    let env = EnvConfig::from_env();
    init_logging(env.log_filter.as_deref());

    let config = CoordinatorConfig::from_env().map_err(io::Error::other)?;
    let service = CoordinatorService::build(&config).map_err(io::Error::other)?;

    let socket_path = config.socket_path();
    let listener = bind_socket(&socket_path)?;
    let shutdown = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(%error, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    let served = service.serve(listener, shutdown).await;
    if let Err(error) = std::fs::remove_file(&socket_path) {
        tracing::debug!(%error, "socket file already removed");
    }
    served
}
