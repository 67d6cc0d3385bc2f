//! Shared contract between the coordinator process and presentation processes.
//!
//! This crate defines only the data model, the `{success, data?, error?}` reply
//! envelope, the request/push frames, and the traits of external collaborators.
//! It carries no transport, no runtime, and no HTTP concerns.

pub mod envelope;
pub mod frame;
pub mod model;
pub mod service;

pub use envelope::{ErrorKind, Response, WireError};
pub use frame::{
    AuthCredentials, CoordinatorFrame, PasswordReset, Push, Request, RequestFrame, RequestId,
};
pub use model::{
    ApplicationSnapshot, Conversation, CredentialExposure, CredentialState, Message,
    PartialSnapshot, Role, Space, UserIdentity,
};
pub use service::{AuthService, AuthSession, DataService, ServiceError};
