//! Cross-process state synchronization for a multi-window chat client.
//!
//! One coordinator process owns the authoritative [`ApplicationSnapshot`] and
//! every outbound credential; presentation processes hold a read-only
//! [`MirrorStore`] that is replaced wholesale on each push.
//!
//! # Public API Overview
//! - Run the authoritative side with [`Coordinator`], which owns the
//!   [`CoordinatorStore`], [`SyncBroadcaster`] and [`RequestRouter`].
//! - Attach presentation channels with [`Coordinator::attach`] or
//!   [`serve_connection`] over any `AsyncRead + AsyncWrite` stream.
//! - Mirror the snapshot in a presentation process with [`MirrorStore`].
//! - Configure via [`EnvConfig`] and [`SyncConfig`]; install logging with
//!   [`init_logging`].
//!
//! Invariant: only the coordinator store mutates the snapshot, and every
//! mutation bumps the revision and is pushed to each channel in order.

pub mod channel;
pub mod config;
pub mod coordinator;
pub mod logging;
pub mod mirror;

/// Channel transport.
pub use crate::channel::{serve_connection, ChannelError, FrameReader, InboundLine, MAX_FRAME_BYTES};
/// Environment and behavior configuration.
pub use crate::config::{EnvConfig, SyncConfig, DEFAULT_FETCH_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
/// Coordinator-side components.
pub use crate::coordinator::broadcaster::{ChannelId, Subscription, SyncBroadcaster};
pub use crate::coordinator::router::RequestRouter;
pub use crate::coordinator::store::{CoordinatorStore, FetchedState, StoreEvent, StorePhase};
pub use crate::coordinator::Coordinator;
pub use crate::logging::init_logging;
/// Presentation-side replica.
pub use crate::mirror::{MirrorConfig, MirrorState, MirrorStore};

/// Shared wire model.
pub use sync_protocol::{
    ApplicationSnapshot, AuthCredentials, CredentialExposure, CredentialState, ErrorKind,
    PartialSnapshot, Request, Response, WireError,
};
