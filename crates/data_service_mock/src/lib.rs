//! Deterministic in-memory implementations of the `sync_protocol` collaborator traits.
//!
//! Every call is counted per [`MockOp`] and failures or delays can be scripted,
//! so coordinator tests can assert exactly how often the data service was hit.

mod auth;
mod data;
mod script;

pub use auth::{MockAuthService, MOCK_EXPIRES_AT};
pub use data::{MockData, MockDataService};
pub use script::MockOp;
