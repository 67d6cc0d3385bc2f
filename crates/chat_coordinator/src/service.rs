use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;

use auth_client::{
    AuthSignal, AuthenticatedClient, Clock, HttpRefreshTransport, HttpTransport, RefreshScheduler,
    ReqwestTransport, SystemClock, TokenVault,
};
use chat_sync::{Coordinator, CoordinatorStore};
use data_service_http::{HttpAuthService, HttpDataService, HttpEndpoints};
use data_service_mock::{MockAuthService, MockDataService};
use sync_protocol::{AuthService, DataService};
use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, CoordinatorConfig, DataSource};

/// A wired coordinator plus the background tasks that keep its session alive.
pub struct CoordinatorService {
    coordinator: Arc<Coordinator>,
    client: Option<Arc<AuthenticatedClient>>,
    scheduler: Option<RefreshScheduler>,
    signal_watcher: Option<JoinHandle<()>>,
}

impl CoordinatorService {
    /// Builds collaborators for `config.data_source`. Must run inside a tokio runtime.
    pub fn build(config: &CoordinatorConfig) -> Result<Self, ConfigError> {
        let vault = Arc::new(TokenVault::new());
        match config.data_source {
            DataSource::Mock => {
                let coordinator = Coordinator::new(
                    vault,
                    Arc::new(MockDataService::fixture()),
                    Arc::new(MockAuthService::new()),
                    config.sync_config(),
                );
                tracing::info!("coordinator using mock data source");
                Ok(Self {
                    coordinator: Arc::new(coordinator),
                    client: None,
                    scheduler: None,
                    signal_watcher: None,
                })
            }
            DataSource::Http => Self::build_http(config, vault),
        }
    }

    fn build_http(config: &CoordinatorConfig, vault: Arc<TokenVault>) -> Result<Self, ConfigError> {
        let endpoints = HttpEndpoints::new(
            config.rest_url.as_deref().unwrap_or_default(),
            config.auth_url.as_deref().unwrap_or_default(),
        )?;
        let auth_config = config.auth_client_config(endpoints.token_url()?);

        let http: Arc<dyn HttpTransport> =
            Arc::new(ReqwestTransport::new(auth_config.request_timeout)?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let refresh = Arc::new(HttpRefreshTransport::new(
            Arc::clone(&http),
            auth_config.clone(),
            Arc::clone(&clock),
        ));
        let client = Arc::new(AuthenticatedClient::new(
            auth_config.clone(),
            Arc::clone(&vault),
            Arc::clone(&http),
            refresh,
            Arc::clone(&clock),
        ));

        let data: Arc<dyn DataService> =
            Arc::new(HttpDataService::new(Arc::clone(&client), endpoints.clone()));
        let auth: Arc<dyn AuthService> = Arc::new(HttpAuthService::new(
            http,
            auth_config,
            endpoints,
            Arc::clone(&clock),
        ));
        let coordinator = Arc::new(Coordinator::new(
            Arc::clone(&vault),
            data,
            auth,
            config.sync_config(),
        ));

        let signal_watcher =
            spawn_signal_watcher(client.subscribe(), Arc::clone(coordinator.store()));
        let scheduler = config.proactive_refresh.then(|| {
            RefreshScheduler::spawn(
                vault,
                Arc::clone(client.refresher()),
                clock,
                config.expiry_buffer_secs,
            )
        });
        tracing::info!(
            proactive_refresh = config.proactive_refresh,
            "coordinator using http data source"
        );

        Ok(Self {
            coordinator,
            client: Some(client),
            scheduler,
            signal_watcher: Some(signal_watcher),
        })
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn client(&self) -> Option<&Arc<AuthenticatedClient>> {
        self.client.as_ref()
    }

    #[must_use]
    pub fn proactive_refresh_running(&self) -> bool {
        self.scheduler
            .as_ref()
            .is_some_and(RefreshScheduler::is_running)
    }

    /// Accepts presentation connections until `shutdown` resolves.
    pub async fn serve<F>(&self, listener: UnixListener, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("coordinator shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, _address) = accepted?;
                    let channel = self.coordinator.attach(stream);
                    tokio::spawn(async move {
                        match channel.await {
                            Ok(Ok(())) => {}
                            Ok(Err(error)) => tracing::warn!(%error, "presentation channel failed"),
                            Err(error) => tracing::warn!(%error, "presentation channel task aborted"),
                        }
                    });
                }
            }
        }
    }
}

impl Drop for CoordinatorService {
    fn drop(&mut self) {
        if let Some(watcher) = &self.signal_watcher {
            watcher.abort();
        }
    }
}

/// Binds the coordinator socket, replacing a stale socket file left by a previous run.
pub fn bind_socket(path: &Path) -> io::Result<UnixListener> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener = UnixListener::bind(path)?;
    tracing::info!(path = %path.display(), "coordinator listening");
    Ok(listener)
}

/// Keeps mirrors in step with the auth client: refreshed credentials are pushed,
/// an irrecoverable credential resets the store.
pub fn spawn_signal_watcher(
    mut signals: broadcast::Receiver<AuthSignal>,
    store: Arc<CoordinatorStore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match signals.recv().await {
                Ok(AuthSignal::SignInRequired { reason }) => {
                    tracing::warn!(%reason, "sign-in required, resetting session");
                    store.reset_on_sign_out();
                }
                Ok(AuthSignal::Refreshed { expires_at }) => {
                    tracing::debug!(expires_at, "access token refreshed");
                    store.record_refresh();
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "auth signals lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
