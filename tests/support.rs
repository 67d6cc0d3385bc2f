#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use auth_client::TokenVault;
use chat_sync::{Coordinator, CredentialState, MirrorState, MirrorStore, SyncConfig};
use data_service_mock::{MockAuthService, MockDataService};
use sync_protocol::{AuthService, DataService};

pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Harness {
    pub coordinator: Coordinator,
    pub data: Arc<MockDataService>,
    pub auth: Arc<MockAuthService>,
}

impl Harness {
    pub fn signed_in() -> Self {
        Self::with_data(MockDataService::fixture(), CredentialState::new("access", "refresh", 4_000_000_000))
    }

    pub fn signed_out() -> Self {
        Self::with_data(MockDataService::fixture(), CredentialState::default())
    }

    pub fn with_data(data: MockDataService, credentials: CredentialState) -> Self {
        let data = Arc::new(data);
        let auth = Arc::new(MockAuthService::new().with_account("ada@example.com", "correct horse"));
        let coordinator = Coordinator::new(
            Arc::new(TokenVault::with_credentials(credentials)),
            Arc::clone(&data) as Arc<dyn DataService>,
            Arc::clone(&auth) as Arc<dyn AuthService>,
            SyncConfig::default(),
        );
        Self {
            coordinator,
            data,
            auth,
        }
    }

    /// A mirror wired to the coordinator through an in-memory duplex stream.
    pub fn mirror(&self) -> MirrorStore {
        let (presentation, coordinator) = tokio::io::duplex(256 * 1024);
        self.coordinator.attach(coordinator);
        MirrorStore::connect(presentation)
    }
}

/// Waits until the mirror state satisfies `predicate` and returns that state.
pub async fn wait_for_state(
    mirror: &MirrorStore,
    predicate: impl FnMut(&MirrorState) -> bool,
) -> MirrorState {
    let mut updates = mirror.subscribe();
    let state = tokio::time::timeout(STEP_TIMEOUT, updates.wait_for(predicate))
        .await
        .expect("mirror state reached in time")
        .expect("mirror state channel open");
    state.clone()
}

pub async fn loaded(mirror: &MirrorStore) -> MirrorState {
    wait_for_state(mirror, |state| !state.is_loading).await
}
