use serde::Deserialize;
use sync_protocol::ServiceError;
use thiserror::Error;

/// Failure of one refresh-token exchange.
///
/// Cloneable because every waiter of a single-flight refresh observes the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("no refresh token is available")]
    NoRefreshToken,
    #[error("refresh token was rejected: {0}")]
    InvalidRefreshToken(String),
    #[error("refresh endpoint returned HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("refresh request failed: {0}")]
    Network(String),
    #[error("refresh timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },
    #[error("malformed refresh response: {0}")]
    MalformedResponse(String),
    #[error("session was cleared while the refresh was in flight")]
    SessionCleared,
    #[error("refresh is misconfigured: {0}")]
    Configuration(String),
}

impl RefreshError {
    /// True when the credential cannot recover without the user signing in again.
    #[must_use]
    pub fn forces_sign_out(&self) -> bool {
        match self {
            Self::NoRefreshToken | Self::InvalidRefreshToken(_) | Self::SessionCleared => true,
            Self::Rejected { status, .. } => (400..500).contains(status),
            Self::Network(_)
            | Self::Timeout { .. }
            | Self::MalformedResponse(_)
            | Self::Configuration(_) => false,
        }
    }
}

/// Failure at the HTTP transport layer, before any status code is known.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_connect() {
            Self::Connect(error.to_string())
        } else {
            Self::Other(error.to_string())
        }
    }
}

/// Failure of an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Missing or irrecoverable credential; the user must sign in again.
    #[error("unauthenticated: {reason}")]
    Unauthenticated { reason: String },
    #[error("network failure: {0}")]
    Network(String),
    /// Non-2xx status other than an authorization failure.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("failed to decode response body: {0}")]
    Decode(String),
}

impl RequestError {
    #[must_use]
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthenticated { .. })
    }
}

impl From<TransportError> for RequestError {
    fn from(error: TransportError) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<RequestError> for ServiceError {
    fn from(error: RequestError) -> Self {
        match error {
            RequestError::Unauthenticated { reason } => Self::Unauthenticated(reason),
            RequestError::Network(message) => Self::Network(message),
            RequestError::InvalidRequest(message) => Self::Validation(message),
            RequestError::Status { status, message } if status == 400 || status == 422 => {
                Self::Validation(message)
            }
            RequestError::Status { status, message } => {
                Self::Upstream(format!("HTTP {status}: {message}"))
            }
            RequestError::Decode(message) => Self::Upstream(message),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    error: Option<ErrorField>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorField {
    Code(String),
    Detail {
        #[serde(default)]
        message: Option<String>,
    },
}

/// Extracts a human-readable message from an error response body.
pub fn parse_error_message(status: u16, body: &str) -> String {
    let fallback = || {
        if body.trim().is_empty() {
            reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|status| status.canonical_reason())
                .unwrap_or("request failed")
                .to_string()
        } else {
            body.trim().to_string()
        }
    };

    let Ok(payload) = serde_json::from_str::<ErrorPayload>(body) else {
        return fallback();
    };

    let from_error_field = match payload.error {
        Some(ErrorField::Detail { message }) => message,
        Some(ErrorField::Code(code)) => Some(code),
        None => None,
    };

    payload
        .error_description
        .or(payload.message)
        .or(payload.msg)
        .or(from_error_field)
        .and_then(non_empty)
        .unwrap_or_else(fallback)
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_message_prefers_description_fields() {
        assert_eq!(
            parse_error_message(400, r#"{"error":"invalid_grant","error_description":"Refresh Token Not Found"}"#),
            "Refresh Token Not Found"
        );
        assert_eq!(
            parse_error_message(500, r#"{"error":{"message":"database unavailable"}}"#),
            "database unavailable"
        );
        assert_eq!(parse_error_message(409, r#"{"msg":"duplicate"}"#), "duplicate");
    }

    #[test]
    fn parse_error_message_falls_back_to_body_or_reason() {
        assert_eq!(parse_error_message(502, "upstream down"), "upstream down");
        assert_eq!(parse_error_message(404, ""), "Not Found");
    }

    #[test]
    fn transient_refresh_failures_do_not_force_sign_out() {
        assert!(!RefreshError::Network("reset".into()).forces_sign_out());
        assert!(!RefreshError::Timeout { after_ms: 10 }.forces_sign_out());
        assert!(RefreshError::InvalidRefreshToken("revoked".into()).forces_sign_out());
        assert!(RefreshError::NoRefreshToken.forces_sign_out());
        assert!(RefreshError::Rejected {
            status: 403,
            message: "banned".into()
        }
        .forces_sign_out());
        assert!(!RefreshError::Rejected {
            status: 503,
            message: "maintenance".into()
        }
        .forces_sign_out());
    }

    #[test]
    fn request_errors_map_to_service_errors() {
        assert_eq!(
            ServiceError::from(RequestError::Unauthenticated {
                reason: "expired".into()
            }),
            ServiceError::Unauthenticated("expired".into())
        );
        assert_eq!(
            ServiceError::from(RequestError::Status {
                status: 422,
                message: "bad name".into()
            }),
            ServiceError::Validation("bad name".into())
        );
        assert_eq!(
            ServiceError::from(RequestError::Status {
                status: 503,
                message: "busy".into()
            }),
            ServiceError::Upstream("HTTP 503: busy".into())
        );
    }
}
