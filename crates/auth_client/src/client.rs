use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sync_protocol::CredentialState;
use tokio::sync::broadcast;

use crate::clock::{Clock, SystemClock};
use crate::config::AuthClientConfig;
use crate::error::{parse_error_message, RefreshError, RequestError, TransportError};
use crate::headers::build_headers;
use crate::refresher::{AuthRefresher, RefreshTransport};
use crate::retry::is_auth_failure;
use crate::signal::{AuthSignal, AuthSignals};
use crate::token::HttpRefreshTransport;
use crate::transport::{ApiResponse, HttpTransport, OutboundRequest, ReqwestTransport};
use crate::vault::TokenVault;

/// HTTP client that attaches the vault's bearer token and recovers from expiry.
///
/// Policy per request:
/// 1. refresh first when the stored credential is inside the expiry buffer;
/// 2. send with `Authorization: Bearer <access_token>`;
/// 3. on 401/403 refresh once and retry once, a second rejection is terminal.
pub struct AuthenticatedClient {
    config: AuthClientConfig,
    http: Arc<dyn HttpTransport>,
    vault: Arc<TokenVault>,
    refresher: Arc<AuthRefresher>,
    clock: Arc<dyn Clock>,
    signals: AuthSignals,
}

impl AuthenticatedClient {
    pub fn new(
        config: AuthClientConfig,
        vault: Arc<TokenVault>,
        http: Arc<dyn HttpTransport>,
        refresh: Arc<dyn RefreshTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let signals = AuthSignals::new();
        let refresher = Arc::new(AuthRefresher::new(
            Arc::clone(&vault),
            refresh,
            config.refresh_timeout,
            signals.clone(),
        ));

        Self {
            config,
            http,
            vault,
            refresher,
            clock,
            signals,
        }
    }

    /// Production wiring: reqwest for both data calls and token exchange.
    pub fn with_reqwest(
        config: AuthClientConfig,
        vault: Arc<TokenVault>,
    ) -> Result<Self, TransportError> {
        let http: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(config.request_timeout)?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let refresh = Arc::new(HttpRefreshTransport::new(
            Arc::clone(&http),
            config.clone(),
            Arc::clone(&clock),
        ));
        Ok(Self::new(config, vault, http, refresh, clock))
    }

    pub fn vault(&self) -> &Arc<TokenVault> {
        &self.vault
    }

    pub fn refresher(&self) -> &Arc<AuthRefresher> {
        &self.refresher
    }

    pub fn signals(&self) -> &AuthSignals {
        &self.signals
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &AuthClientConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthSignal> {
        self.signals.subscribe()
    }

    /// Sends one authenticated request and returns its successful response.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<ApiResponse, RequestError> {
        let access_token = self.ensure_fresh().await?;
        let response = self
            .send_once(&method, url, body.as_ref(), &access_token)
            .await?;
        if !is_auth_failure(response.status) {
            return into_success(response);
        }

        if !self.vault.has_refresh_token() {
            return Err(self.sign_in_required(format!(
                "HTTP {}: {}",
                response.status,
                parse_error_message(response.status, &response.body)
            )));
        }

        tracing::debug!(status = response.status, %url, "authorization rejected, refreshing once");
        let refreshed = self.refresh_for_request().await?;
        let access_token = bearer_of(&refreshed)?;
        let retried = self
            .send_once(&method, url, body.as_ref(), &access_token)
            .await?;
        if is_auth_failure(retried.status) {
            return Err(self.sign_in_required(format!(
                "HTTP {} after refresh: {}",
                retried.status,
                parse_error_message(retried.status, &retried.body)
            )));
        }

        into_success(retried)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, RequestError> {
        self.request(Method::GET, url, None).await?.json()
    }

    pub async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T, RequestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)
            .map_err(|error| RequestError::InvalidRequest(error.to_string()))?;
        self.request(Method::POST, url, Some(body)).await?.json()
    }

    /// Like [`Self::post_json`] for endpoints whose response body is ignored.
    pub async fn post_unit<B>(&self, url: &str, body: &B) -> Result<(), RequestError>
    where
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body)
            .map_err(|error| RequestError::InvalidRequest(error.to_string()))?;
        self.request(Method::POST, url, Some(body)).await.map(|_| ())
    }

    async fn ensure_fresh(&self) -> Result<String, RequestError> {
        let current = self.vault.get();
        let has_access = current
            .access_token
            .as_deref()
            .is_some_and(|token| !token.trim().is_empty());
        let has_refresh = current.has_refresh_token();

        if !has_access && !has_refresh {
            return Err(RequestError::Unauthenticated {
                reason: "no credential is stored".to_owned(),
            });
        }

        let now = self.clock.now_epoch_seconds();
        let expired = self.vault.is_expired(now, self.config.expiry_buffer_secs);
        if has_refresh && (expired || !has_access) {
            tracing::debug!(expires_at = ?current.expires_at, now, "credential expired, refreshing before request");
            let refreshed = self.refresh_for_request().await?;
            return bearer_of(&refreshed);
        }

        bearer_of(&current)
    }

    async fn refresh_for_request(&self) -> Result<CredentialState, RequestError> {
        match self.refresher.refresh().await {
            Ok(credentials) => Ok(credentials),
            Err(error) if error.forces_sign_out() => Err(self.sign_in_required(error.to_string())),
            Err(error) => Err(transient_refresh_failure(error)),
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        access_token: &str,
    ) -> Result<ApiResponse, RequestError> {
        let headers = build_headers(&self.config, Some(access_token))?;
        let request = OutboundRequest {
            method: method.clone(),
            url: url.to_owned(),
            headers,
            body: body.cloned(),
        };
        Ok(self.http.send(request).await?)
    }

    fn sign_in_required(&self, reason: String) -> RequestError {
        self.signals.sign_in_required(reason.clone());
        RequestError::Unauthenticated { reason }
    }
}

fn bearer_of(credentials: &CredentialState) -> Result<String, RequestError> {
    credentials
        .access_token
        .clone()
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| RequestError::Unauthenticated {
            reason: "no access token is stored".to_owned(),
        })
}

fn into_success(response: ApiResponse) -> Result<ApiResponse, RequestError> {
    if response.is_success() {
        return Ok(response);
    }
    Err(RequestError::Status {
        status: response.status,
        message: parse_error_message(response.status, &response.body),
    })
}

fn transient_refresh_failure(error: RefreshError) -> RequestError {
    match error {
        RefreshError::Rejected { status, message } => RequestError::Status { status, message },
        RefreshError::MalformedResponse(message) => RequestError::Decode(message),
        RefreshError::Configuration(message) => RequestError::InvalidRequest(message),
        other => RequestError::Network(other.to_string()),
    }
}
