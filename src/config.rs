//! Environment configuration.

use std::env;
use std::time::Duration;

use sync_protocol::CredentialExposure;

/// Upper bound for one full fetch against the data service.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound for a mirror request awaiting its reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub socket_path: Option<String>,
    pub log_filter: Option<String>,
    pub expiry_buffer_secs: Option<i64>,
    pub proactive_refresh: bool,
    pub credential_exposure: Option<CredentialExposure>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            socket_path: env_string_opt("CHAT_SYNC_SOCKET"),
            log_filter: env_string_opt("CHAT_SYNC_LOG"),
            expiry_buffer_secs: env_string_opt("CHAT_SYNC_EXPIRY_BUFFER_SECS")
                .and_then(|value| value.trim().parse::<i64>().ok())
                .filter(|seconds| *seconds >= 0),
            proactive_refresh: env_flag("CHAT_SYNC_PROACTIVE_REFRESH"),
            credential_exposure: env_string_opt("CHAT_SYNC_CREDENTIAL_EXPOSURE")
                .and_then(|value| parse_exposure(&value)),
        }
    }
}

/// Behavior knobs of the coordinator's store and router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub fetch_timeout: Duration,
    pub credential_exposure: CredentialExposure,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            credential_exposure: CredentialExposure::default(),
        }
    }
}

impl SyncConfig {
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_credential_exposure(mut self, exposure: CredentialExposure) -> Self {
        self.credential_exposure = exposure;
        self
    }

    /// Applies the environment overrides that concern the coordinator.
    pub fn with_env(mut self, env: &EnvConfig) -> Self {
        if let Some(exposure) = env.credential_exposure {
            self.credential_exposure = exposure;
        }
        self
    }
}

pub fn parse_exposure(value: &str) -> Option<CredentialExposure> {
    match value.trim().to_ascii_lowercase().as_str() {
        "full" => Some(CredentialExposure::Full),
        "access_only" | "access-only" => Some(CredentialExposure::AccessOnly),
        "hidden" => Some(CredentialExposure::Hidden),
        _ => None,
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
