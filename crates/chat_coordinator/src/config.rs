//! JSON configuration file of the coordinator daemon.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use auth_client::{AuthClientConfig, DEFAULT_EXPIRY_BUFFER_SECS, DEFAULT_REFRESH_TIMEOUT};
use chat_sync::{EnvConfig, SyncConfig, DEFAULT_FETCH_TIMEOUT};
use serde::Deserialize;
use sync_protocol::CredentialExposure;
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "CHAT_SYNC_CONFIG_PATH";
pub const DEFAULT_SOCKET_NAME: &str = "chat-sync.sock";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error(transparent)]
    Endpoint(#[from] data_service_http::EndpointError),
    #[error(transparent)]
    Transport(#[from] auth_client::TransportError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// In-memory fixture data; no network access.
    #[default]
    Mock,
    Http,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinatorConfig {
    pub data_source: DataSource,
    pub rest_url: Option<String>,
    pub auth_url: Option<String>,
    pub api_key: Option<String>,
    pub socket_path: Option<PathBuf>,
    pub fetch_timeout_ms: u64,
    pub refresh_timeout_ms: u64,
    pub request_timeout_ms: Option<u64>,
    pub expiry_buffer_secs: i64,
    pub proactive_refresh: bool,
    pub credential_exposure: CredentialExposure,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            data_source: DataSource::default(),
            rest_url: None,
            auth_url: None,
            api_key: None,
            socket_path: None,
            fetch_timeout_ms: millis(DEFAULT_FETCH_TIMEOUT),
            refresh_timeout_ms: millis(DEFAULT_REFRESH_TIMEOUT),
            request_timeout_ms: None,
            expiry_buffer_secs: DEFAULT_EXPIRY_BUFFER_SECS,
            proactive_refresh: false,
            credential_exposure: CredentialExposure::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Reads the file named by `CHAT_SYNC_CONFIG_PATH`, or the defaults when unset,
    /// then applies environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env = EnvConfig::from_env();
        let config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load(Path::new(path.trim()))?,
            _ => Self::default(),
        };
        let config = config.with_env(&env);
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_env(mut self, env: &EnvConfig) -> Self {
        if let Some(socket_path) = &env.socket_path {
            self.socket_path = Some(PathBuf::from(socket_path));
        }
        if let Some(seconds) = env.expiry_buffer_secs {
            self.expiry_buffer_secs = seconds;
        }
        if env.proactive_refresh {
            self.proactive_refresh = true;
        }
        if let Some(exposure) = env.credential_exposure {
            self.credential_exposure = exposure;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_timeout_ms == 0 {
            return Err(ConfigError::Invalid("fetch_timeout_ms must be > 0".to_string()));
        }
        if self.refresh_timeout_ms == 0 {
            return Err(ConfigError::Invalid("refresh_timeout_ms must be > 0".to_string()));
        }
        if self.request_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("request_timeout_ms must be > 0".to_string()));
        }
        if self.expiry_buffer_secs < 0 {
            return Err(ConfigError::Invalid("expiry_buffer_secs must be >= 0".to_string()));
        }
        if self.data_source == DataSource::Http {
            for (field, value) in [("rest_url", &self.rest_url), ("auth_url", &self.auth_url)] {
                if value.as_deref().map_or(true, |url| url.trim().is_empty()) {
                    return Err(ConfigError::Invalid(format!(
                        "{field} is required for the http data source"
                    )));
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_SOCKET_NAME))
    }

    #[must_use]
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::default()
            .with_fetch_timeout(Duration::from_millis(self.fetch_timeout_ms))
            .with_credential_exposure(self.credential_exposure)
    }

    /// Auth client settings; `token_url` comes from the resolved endpoints.
    #[must_use]
    pub fn auth_client_config(&self, token_url: String) -> AuthClientConfig {
        let mut config = AuthClientConfig::new(token_url)
            .with_expiry_buffer_secs(self.expiry_buffer_secs)
            .with_refresh_timeout(Duration::from_millis(self.refresh_timeout_ms))
            .with_user_agent(concat!("chat-coordinator/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout_ms) = self.request_timeout_ms {
            config = config.with_request_timeout(Duration::from_millis(timeout_ms));
        }
        if let Some(api_key) = &self.api_key {
            config = config.insert_header("apikey", api_key.clone());
        }
        config
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
