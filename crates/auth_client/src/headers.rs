use std::collections::BTreeMap;

use crate::config::AuthClientConfig;
use crate::error::RequestError;

pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_USER_AGENT: &str = "user-agent";

pub const DEFAULT_USER_AGENT: &str = concat!("chat-sync/", env!("CARGO_PKG_VERSION"));

/// Builds a deterministic header map for one outbound request.
///
/// `access_token` is attached as a bearer credential when present.
pub fn build_headers(
    config: &AuthClientConfig,
    access_token: Option<&str>,
) -> Result<BTreeMap<String, String>, RequestError> {
    let mut headers = BTreeMap::new();

    headers.insert(HEADER_ACCEPT.to_owned(), "application/json".to_owned());
    headers.insert(
        HEADER_CONTENT_TYPE.to_owned(),
        "application/json".to_owned(),
    );

    let user_agent = config
        .user_agent
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_USER_AGENT);
    headers.insert(HEADER_USER_AGENT.to_owned(), user_agent.to_owned());

    for (key, value) in &config.extra_headers {
        let key = key.trim().to_ascii_lowercase();
        if key == HEADER_AUTHORIZATION {
            return Err(RequestError::InvalidRequest(
                "authorization cannot be set through extra headers".to_owned(),
            ));
        }
        headers.insert(key, value.trim().to_owned());
    }

    if let Some(token) = access_token.map(str::trim).filter(|token| !token.is_empty()) {
        headers.insert(HEADER_AUTHORIZATION.to_owned(), format!("Bearer {token}"));
    }

    Ok(headers)
}
