use std::sync::Arc;

use async_trait::async_trait;
use auth_client::headers::build_headers;
use auth_client::{
    credential_from_token_body, error::parse_error_message, ApiResponse, AuthClientConfig, Clock,
    HttpTransport, Method, OutboundRequest,
};
use serde::Deserialize;
use serde_json::{json, Value};
use sync_protocol::{AuthCredentials, AuthService, AuthSession, ServiceError, UserIdentity};

use crate::endpoints::HttpEndpoints;
use crate::rows::UserRow;

#[derive(Debug, Deserialize)]
struct SessionEnvelope {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    user: Option<UserRow>,
}

/// [`AuthService`] speaking a GoTrue-style password grant API.
///
/// Calls here precede any stored credential, so they go straight through the
/// transport with only the configured fixed headers attached.
pub struct HttpAuthService {
    http: Arc<dyn HttpTransport>,
    config: AuthClientConfig,
    endpoints: HttpEndpoints,
    clock: Arc<dyn Clock>,
}

impl HttpAuthService {
    pub fn new(
        http: Arc<dyn HttpTransport>,
        config: AuthClientConfig,
        endpoints: HttpEndpoints,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http,
            config,
            endpoints,
            clock,
        }
    }

    async fn post(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: Value,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, ServiceError> {
        let url = self
            .endpoints
            .auth(path, query)
            .map_err(|error| ServiceError::Validation(error.to_string()))?;
        let headers = build_headers(&self.config, bearer).map_err(ServiceError::from)?;
        let response = self
            .http
            .send(OutboundRequest {
                method: Method::POST,
                url,
                headers,
                body: Some(body),
            })
            .await
            .map_err(|error| ServiceError::Network(error.to_string()))?;

        if response.is_success() {
            return Ok(response);
        }
        Err(status_error(&response))
    }

    fn session_from(&self, body: &str) -> Result<Option<AuthSession>, ServiceError> {
        let envelope: SessionEnvelope = serde_json::from_str(body)
            .map_err(|error| ServiceError::Upstream(format!("malformed auth response: {error}")))?;
        if envelope.access_token.is_none() {
            return Ok(None);
        }

        let credentials = credential_from_token_body(body, self.clock.now_epoch_seconds())
            .map_err(|reason| ServiceError::Upstream(format!("malformed auth response: {reason}")))?;
        Ok(Some(AuthSession {
            credentials,
            user: envelope.user.map(UserIdentity::from),
        }))
    }
}

fn status_error(response: &ApiResponse) -> ServiceError {
    let message = parse_error_message(response.status, &response.body);
    match response.status {
        400 | 422 => ServiceError::Validation(message),
        401 | 403 => ServiceError::Unauthenticated(message),
        429 => ServiceError::Network(message),
        status => ServiceError::Upstream(format!("HTTP {status}: {message}")),
    }
}

#[async_trait]
impl AuthService for HttpAuthService {
    async fn sign_in(&self, credentials: &AuthCredentials) -> Result<AuthSession, ServiceError> {
        let response = self
            .post(
                "token",
                &[("grant_type", "password")],
                json!({ "email": credentials.email, "password": credentials.password }),
                None,
            )
            .await?;

        self.session_from(&response.body)?.ok_or_else(|| {
            ServiceError::Upstream("sign-in response carried no session".to_string())
        })
    }

    async fn sign_up(
        &self,
        credentials: &AuthCredentials,
    ) -> Result<Option<AuthSession>, ServiceError> {
        let response = self
            .post(
                "signup",
                &[],
                json!({ "email": credentials.email, "password": credentials.password }),
                None,
            )
            .await?;

        let session = self.session_from(&response.body)?;
        if session.is_none() {
            tracing::info!("sign-up accepted, confirmation pending");
        }
        Ok(session)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), ServiceError> {
        self.post("logout", &[], json!({}), Some(access_token))
            .await
            .map(|_| ())
    }

    async fn reset_password(&self, email: &str) -> Result<(), ServiceError> {
        self.post("recover", &[], json!({ "email": email }), None)
            .await
            .map(|_| ())
    }
}
