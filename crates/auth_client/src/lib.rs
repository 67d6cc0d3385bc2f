//! Bearer-credential lifecycle for outbound HTTP calls.
//!
//! [`TokenVault`] holds the access/refresh tokens, [`AuthRefresher`] exchanges
//! the refresh token with at most one exchange in flight, and
//! [`AuthenticatedClient`] is the single network entry point that attaches the
//! bearer token, refreshes once on 401/403 and retries once.
//!
//! Irrecoverable credentials are reported through [`AuthSignals`] so the owner
//! of the session can route the user to sign-in.

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod flight;
pub mod headers;
pub mod jwt;
pub mod refresher;
pub mod retry;
pub mod scheduler;
pub mod signal;
pub mod token;
pub mod transport;
pub mod vault;

pub use client::AuthenticatedClient;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthClientConfig, DEFAULT_EXPIRY_BUFFER_SECS, DEFAULT_REFRESH_TIMEOUT};
pub use error::{RefreshError, RequestError, TransportError};
pub use flight::SingleFlight;
pub use refresher::{AuthRefresher, RefreshTransport};
pub use scheduler::RefreshScheduler;
pub use signal::{AuthSignal, AuthSignals};
pub use token::{credential_from_token_body, HttpRefreshTransport};
pub use transport::{ApiResponse, HttpTransport, OutboundRequest, ReqwestTransport};
pub use vault::TokenVault;

pub use reqwest::Method;
