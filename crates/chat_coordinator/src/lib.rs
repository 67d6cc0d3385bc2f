//! Coordinator daemon: owns the session and serves presentation processes over
//! a Unix domain socket.
//!
//! Configuration comes from the JSON file named by `CHAT_SYNC_CONFIG_PATH`
//! (defaults when unset) with `CHAT_SYNC_*` environment overrides applied on
//! top. The `mock` data source needs no network; `http` talks to the REST data
//! API and auth provider through `auth_client`.

pub mod config;
pub mod service;

pub use config::{ConfigError, CoordinatorConfig, DataSource, CONFIG_PATH_ENV};
pub use service::{bind_socket, spawn_signal_watcher, CoordinatorService};
