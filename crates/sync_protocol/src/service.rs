//! Interfaces of the external collaborators the coordinator calls into.
//!
//! Persistence, caching and the auth provider live behind these traits; the
//! coordinator only orchestrates calls and converts their failures into replies.

use async_trait::async_trait;
use thiserror::Error;

use crate::envelope::{ErrorKind, WireError};
use crate::frame::AuthCredentials;
use crate::model::{Conversation, CredentialState, Message, Space, UserIdentity};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("not authenticated: {0}")]
    Unauthenticated(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("data service error: {0}")]
    Upstream(String),
}

impl ServiceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated(_) => ErrorKind::Unauthenticated,
            Self::Network(_) => ErrorKind::TransientNetworkError,
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Upstream(_) => ErrorKind::UpstreamError,
        }
    }
}

impl From<ServiceError> for WireError {
    fn from(error: ServiceError) -> Self {
        let kind = error.kind();
        let message = match error {
            ServiceError::Unauthenticated(message)
            | ServiceError::Network(message)
            | ServiceError::Validation(message)
            | ServiceError::Upstream(message) => message,
        };
        WireError::new(kind, message)
    }
}

/// Tokens and identity returned by a successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub credentials: CredentialState,
    pub user: Option<UserIdentity>,
}

/// CRUD data endpoints backing the application snapshot.
#[async_trait]
pub trait DataService: Send + Sync + 'static {
    async fn fetch_user(&self) -> Result<Option<UserIdentity>, ServiceError>;

    async fn fetch_spaces(&self) -> Result<Vec<Space>, ServiceError>;

    async fn fetch_active_space(&self) -> Result<Option<Space>, ServiceError>;

    async fn fetch_conversations(&self, space_id: &str) -> Result<Vec<Conversation>, ServiceError>;

    async fn fetch_messages(
        &self,
        conversation_ids: &[String],
    ) -> Result<Vec<Message>, ServiceError>;

    /// Marks a space as recently used. Callers treat failures as non-critical.
    async fn touch_space(&self, _space_id: &str) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// Auth provider endpoints reached through the coordinator.
#[async_trait]
pub trait AuthService: Send + Sync + 'static {
    async fn sign_in(&self, credentials: &AuthCredentials) -> Result<AuthSession, ServiceError>;

    /// Returns `None` when the provider requires confirmation before issuing a session.
    async fn sign_up(
        &self,
        credentials: &AuthCredentials,
    ) -> Result<Option<AuthSession>, ServiceError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), ServiceError>;

    async fn reset_password(&self, email: &str) -> Result<(), ServiceError>;
}
