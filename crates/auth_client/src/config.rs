use std::collections::BTreeMap;
use std::time::Duration;

/// Seconds before `expires_at` at which a credential already counts as expired.
pub const DEFAULT_EXPIRY_BUFFER_SECS: i64 = 60;
/// Upper bound for one refresh-token exchange.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration shared by the refresher and the authenticated client.
#[derive(Debug, Clone)]
pub struct AuthClientConfig {
    /// Endpoint exchanging a refresh token for a new access token.
    pub token_url: String,
    /// Expiry buffer applied by the proactive check.
    pub expiry_buffer_secs: i64,
    /// Timeout for one refresh exchange; a timeout settles every waiter with failure.
    pub refresh_timeout: Duration,
    /// Optional per-request timeout for outbound calls.
    pub request_timeout: Option<Duration>,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Additional headers merged into every outbound request (for example an API key).
    pub extra_headers: BTreeMap<String, String>,
}

impl Default for AuthClientConfig {
    fn default() -> Self {
        Self {
            token_url: String::new(),
            expiry_buffer_secs: DEFAULT_EXPIRY_BUFFER_SECS,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            request_timeout: None,
            user_agent: None,
            extra_headers: BTreeMap::new(),
        }
    }
}

impl AuthClientConfig {
    pub fn new(token_url: impl Into<String>) -> Self {
        Self {
            token_url: token_url.into(),
            ..Self::default()
        }
    }

    pub fn with_expiry_buffer_secs(mut self, seconds: i64) -> Self {
        self.expiry_buffer_secs = seconds.max(0);
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.extra_headers.extend(headers);
        self
    }
}
