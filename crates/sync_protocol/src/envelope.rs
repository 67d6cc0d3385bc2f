use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error taxonomy shared by every reply crossing the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No, expired, or irrecoverable credential. Presentation processes navigate to sign-in.
    Unauthenticated,
    TransientNetworkError,
    ValidationError,
    UpstreamError,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::TransientNetworkError => "transient_network_error",
            Self::ValidationError => "validation_error",
            Self::UpstreamError => "upstream_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: ErrorKind,
    pub message: String,
}

impl WireError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, message)
    }

    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientNetworkError, message)
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message)
    }

    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamError, message)
    }

    #[must_use]
    pub fn is_unauthenticated(&self) -> bool {
        self.kind == ErrorKind::Unauthenticated
    }
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for WireError {}

/// `{success, data?, error?}` envelope carried by every reply and push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl Response {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    /// Successful reply carrying `data`; a serialization failure becomes a validation error.
    #[must_use]
    pub fn ok_with<T: Serialize>(data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self {
                success: true,
                data: Some(value),
                error: None,
            },
            Err(error) => Self::failure(WireError::validation(format!(
                "failed to encode reply payload: {error}"
            ))),
        }
    }

    #[must_use]
    pub fn failure(error: WireError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }

    #[must_use]
    pub fn from_result<T: Serialize>(result: Result<Option<T>, WireError>) -> Self {
        match result {
            Ok(Some(data)) => Self::ok_with(&data),
            Ok(None) => Self::ok(),
            Err(error) => Self::failure(error),
        }
    }

    /// Converts the envelope back into a typed result.
    ///
    /// A successful envelope without data decodes as `Ok(None)`.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<Option<T>, WireError> {
        if !self.success {
            return Err(self
                .error
                .unwrap_or_else(|| WireError::upstream("request failed without error detail")));
        }

        match self.data {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some).map_err(|error| {
                WireError::validation(format!("malformed reply payload: {error}"))
            }),
        }
    }
}
