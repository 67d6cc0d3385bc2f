//! The coordinator process: sole owner of the application snapshot.

pub mod broadcaster;
pub mod router;
pub mod store;

use std::sync::Arc;

use auth_client::TokenVault;
use sync_protocol::{AuthService, DataService};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;

use crate::channel::{serve_connection, ChannelError};
use crate::config::SyncConfig;

use self::broadcaster::SyncBroadcaster;
use self::router::RequestRouter;
use self::store::CoordinatorStore;

/// Owns the store, broadcaster and router of one coordinator process.
///
/// Cheap to share: clone the `Arc` handles it exposes or wrap the coordinator
/// itself in an `Arc`.
pub struct Coordinator {
    store: Arc<CoordinatorStore>,
    router: Arc<RequestRouter>,
}

impl Coordinator {
    pub fn new(
        vault: Arc<TokenVault>,
        data: Arc<dyn DataService>,
        auth: Arc<dyn AuthService>,
        config: SyncConfig,
    ) -> Self {
        let broadcaster = SyncBroadcaster::new(config.credential_exposure);
        let store = Arc::new(CoordinatorStore::new(vault, broadcaster));
        let router = Arc::new(RequestRouter::new(Arc::clone(&store), data, auth, config));
        Self { store, router }
    }

    pub fn store(&self) -> &Arc<CoordinatorStore> {
        &self.store
    }

    pub fn router(&self) -> &Arc<RequestRouter> {
        &self.router
    }

    pub fn broadcaster(&self) -> &Arc<SyncBroadcaster> {
        self.store.broadcaster()
    }

    pub fn vault(&self) -> &Arc<TokenVault> {
        self.store.vault()
    }

    /// Serves `stream` as a presentation channel on a background task.
    pub fn attach<S>(&self, stream: S) -> JoinHandle<Result<(), ChannelError>>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        tokio::spawn(serve_connection(stream, Arc::clone(&self.router)))
    }
}
