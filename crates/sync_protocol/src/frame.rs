//! Frames exchanged between presentation processes and the coordinator.

use serde::{Deserialize, Serialize};

use crate::envelope::Response;
use crate::model::PartialSnapshot;

/// Identifier correlating one request with its reply on a single channel.
pub type RequestId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthCredentials {
    pub email: String,
    pub password: String,
}

impl AuthCredentials {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PasswordReset {
    pub email: String,
}

/// Typed request issued by a presentation process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "payload", rename_all = "kebab-case")]
pub enum Request {
    GetState,
    RefreshData,
    SyncState(PartialSnapshot),
    SignIn(AuthCredentials),
    SignUp(AuthCredentials),
    SignOut,
    ResetPassword(PasswordReset),
}

impl Request {
    #[must_use]
    pub fn op(&self) -> &'static str {
        match self {
            Self::GetState => "get-state",
            Self::RefreshData => "refresh-data",
            Self::SyncState(_) => "sync-state",
            Self::SignIn(_) => "sign-in",
            Self::SignUp(_) => "sign-up",
            Self::SignOut => "sign-out",
            Self::ResetPassword(_) => "reset-password",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: RequestId,
    pub request: Request,
}

/// Unsolicited coordinator → presentation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "response", rename_all = "kebab-case")]
pub enum Push {
    StateUpdated(Response),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CoordinatorFrame {
    Reply { id: RequestId, response: Response },
    Push { push: Push },
}
