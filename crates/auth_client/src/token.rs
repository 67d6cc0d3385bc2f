use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use sync_protocol::CredentialState;

use crate::clock::Clock;
use crate::config::AuthClientConfig;
use crate::error::{parse_error_message, RefreshError};
use crate::headers::build_headers;
use crate::jwt::expiry_from_jwt;
use crate::refresher::RefreshTransport;
use crate::retry::is_invalid_refresh_token;
use crate::transport::{HttpTransport, OutboundRequest};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Decodes a token-endpoint body into credential state.
///
/// Expiry resolution order: `expires_at`, then `now + expires_in`, then the JWT `exp` claim.
pub fn credential_from_token_body(body: &str, now_epoch: i64) -> Result<CredentialState, String> {
    let response =
        serde_json::from_str::<TokenResponse>(body).map_err(|error| error.to_string())?;
    if response.access_token.trim().is_empty() {
        return Err("access_token is empty".to_owned());
    }

    let expires_at = response
        .expires_at
        .or_else(|| {
            response
                .expires_in
                .map(|seconds| now_epoch.saturating_add(seconds))
        })
        .or_else(|| expiry_from_jwt(&response.access_token))
        .ok_or_else(|| "token response carries no expiry".to_owned())?;

    Ok(CredentialState {
        access_token: Some(response.access_token),
        refresh_token: response.refresh_token.filter(|token| !token.trim().is_empty()),
        expires_at: Some(expires_at),
    })
}

/// Exchanges refresh tokens against the configured token endpoint.
pub struct HttpRefreshTransport {
    http: Arc<dyn HttpTransport>,
    config: AuthClientConfig,
    clock: Arc<dyn Clock>,
}

impl HttpRefreshTransport {
    pub fn new(http: Arc<dyn HttpTransport>, config: AuthClientConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            http,
            config,
            clock,
        }
    }
}

#[async_trait]
impl RefreshTransport for HttpRefreshTransport {
    async fn exchange(&self, refresh_token: &str) -> Result<CredentialState, RefreshError> {
        if self.config.token_url.trim().is_empty() {
            return Err(RefreshError::Configuration("token_url is empty".to_owned()));
        }

        let headers = build_headers(&self.config, None)
            .map_err(|error| RefreshError::Configuration(error.to_string()))?;
        let request = OutboundRequest {
            method: Method::POST,
            url: self.config.token_url.clone(),
            headers,
            body: Some(json!({ "refresh_token": refresh_token })),
        };

        let response = self
            .http
            .send(request)
            .await
            .map_err(|error| RefreshError::Network(error.to_string()))?;

        if !response.is_success() {
            let message = parse_error_message(response.status, &response.body);
            if is_invalid_refresh_token(response.status, &response.body) {
                return Err(RefreshError::InvalidRefreshToken(message));
            }
            return Err(RefreshError::Rejected {
                status: response.status,
                message,
            });
        }

        credential_from_token_body(&response.body, self.clock.now_epoch_seconds())
            .map_err(RefreshError::MalformedResponse)
    }
}
