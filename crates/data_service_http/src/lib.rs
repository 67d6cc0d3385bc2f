//! HTTP implementations of the `sync_protocol` collaborator traits.
//!
//! Data calls go through [`auth_client::AuthenticatedClient`], so bearer
//! attachment and the refresh/retry policy stay in one place. Auth provider
//! calls that run before a session exists use the plain transport.

mod auth;
mod data;
pub mod endpoints;
mod rows;

pub use auth::HttpAuthService;
pub use data::HttpDataService;
pub use endpoints::{EndpointError, HttpEndpoints};
