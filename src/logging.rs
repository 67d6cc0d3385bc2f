//! Process-wide `tracing` subscriber setup.

use tracing_subscriber::EnvFilter;

/// Filter used when `CHAT_SYNC_LOG` is unset or unparsable.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Installs a fmt subscriber filtered by `filter` (an `EnvFilter` directive string).
///
/// Returns false when a global subscriber was already installed, which makes
/// repeated calls from tests and embedding processes harmless.
pub fn init_logging(filter: Option<&str>) -> bool {
    let filter = filter
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
