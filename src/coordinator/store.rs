use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use auth_client::TokenVault;
use sync_protocol::{
    ApplicationSnapshot, Conversation, Message, PartialSnapshot, Space, UserIdentity, WireError,
};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::broadcast;

use crate::coordinator::broadcaster::SyncBroadcaster;

const EVENT_CAPACITY: usize = 64;

/// Lifecycle phase of the authoritative snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorePhase {
    Empty,
    Loading,
    Loaded,
    Refreshing,
    Error,
}

impl StorePhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Refreshing => "refreshing",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for StorePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One store phase transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub from: StorePhase,
    pub to: StorePhase,
    pub revision: u64,
    pub error: Option<WireError>,
}

/// Result of one successful full fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedState {
    pub user: Option<UserIdentity>,
    pub spaces: Vec<Space>,
    pub active_space: Option<Space>,
    pub conversations: Vec<Conversation>,
    pub messages: Vec<Message>,
}

struct StoreInner {
    snapshot: ApplicationSnapshot,
    phase: StorePhase,
    revision: u64,
    /// Bumped whenever the signed-in session changes.
    session: u64,
}

/// Sole writer of the application snapshot.
///
/// Every mutation bumps the revision and broadcasts while still holding the
/// lock, so each channel observes pushes in mutation order. Credentials are
/// never stored here; reads fill them from the [`TokenVault`].
///
/// A full fetch is tied to the session it started in. Its result is dropped
/// when a sign-out or sign-in lands before it settles.
pub struct CoordinatorStore {
    inner: Mutex<StoreInner>,
    vault: Arc<TokenVault>,
    broadcaster: Arc<SyncBroadcaster>,
    events: broadcast::Sender<StoreEvent>,
}

impl CoordinatorStore {
    pub fn new(vault: Arc<TokenVault>, broadcaster: Arc<SyncBroadcaster>) -> Self {
        let (events, _receiver) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Mutex::new(StoreInner {
                snapshot: ApplicationSnapshot::default(),
                phase: StorePhase::Empty,
                revision: 0,
                session: 0,
            }),
            vault,
            broadcaster,
            events,
        }
    }

    pub fn vault(&self) -> &Arc<TokenVault> {
        &self.vault
    }

    pub fn broadcaster(&self) -> &Arc<SyncBroadcaster> {
        &self.broadcaster
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn phase(&self) -> StorePhase {
        self.lock().phase
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    /// Current snapshot with credentials read from the vault.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ApplicationSnapshot> {
        let inner = self.lock();
        Arc::new(self.with_credentials(&inner.snapshot))
    }

    /// True when `get-state` must fetch before replying.
    #[must_use]
    pub fn needs_fetch(&self) -> bool {
        let inner = self.lock();
        !inner.snapshot.initial_data_loaded
            || (self.vault.access_token().is_some() && inner.snapshot.core_collections_empty())
    }

    /// Merges `partial`, marks the data loaded, and broadcasts.
    pub fn set_snapshot(&self, partial: PartialSnapshot) -> Arc<ApplicationSnapshot> {
        let mut inner = self.lock();
        inner.snapshot.apply_partial(partial);
        inner.snapshot.initial_data_loaded = true;
        if matches!(inner.phase, StorePhase::Empty | StorePhase::Error) {
            self.transition(&mut inner, StorePhase::Loaded, None);
        }
        self.commit(&mut inner)
    }

    /// Records the user of a fresh session; credentials were already written to the vault.
    pub fn record_sign_in(&self, user: Option<UserIdentity>) -> Arc<ApplicationSnapshot> {
        let mut inner = self.lock();
        inner.session += 1;
        inner.snapshot.user = user;
        self.commit(&mut inner)
    }

    /// Pushes the vault's current credentials after a token refresh.
    pub fn record_refresh(&self) -> Arc<ApplicationSnapshot> {
        let mut inner = self.lock();
        tracing::debug!(revision = inner.revision + 1, "credentials refreshed");
        self.commit(&mut inner)
    }

    /// Replaces the snapshot with empty defaults, clears the vault, and broadcasts.
    pub fn reset_on_sign_out(&self) -> Arc<ApplicationSnapshot> {
        let mut inner = self.lock();
        self.vault.clear();
        inner.session += 1;
        inner.snapshot = ApplicationSnapshot::default();
        self.transition(&mut inner, StorePhase::Empty, None);
        tracing::info!("session reset, snapshot cleared");
        self.commit(&mut inner)
    }

    /// Marks a full fetch as started: `Loading` before the first load, `Refreshing` after.
    ///
    /// Returns the session the fetch belongs to.
    pub fn begin_fetch(&self) -> u64 {
        let mut inner = self.lock();
        let next = if inner.snapshot.initial_data_loaded {
            StorePhase::Refreshing
        } else {
            StorePhase::Loading
        };
        self.transition(&mut inner, next, None);
        inner.session
    }

    /// Installs a completed full fetch and broadcasts it.
    ///
    /// Returns `None` without touching the snapshot when `session` has ended.
    pub fn complete_fetch(
        &self,
        session: u64,
        fetched: FetchedState,
    ) -> Option<Arc<ApplicationSnapshot>> {
        let last_fetched = OffsetDateTime::now_utc().format(&Rfc3339).ok();

        let mut inner = self.lock();
        if inner.session != session {
            tracing::info!(
                fetch_session = session,
                current_session = inner.session,
                "discarding fetch from an ended session"
            );
            return None;
        }
        let snapshot = &mut inner.snapshot;
        snapshot.user = fetched.user;
        snapshot.spaces = fetched.spaces;
        snapshot.active_space = fetched.active_space;
        snapshot.conversations = fetched.conversations;
        snapshot.messages = fetched.messages;
        snapshot.initial_data_loaded = true;
        if last_fetched.is_some() {
            snapshot.last_fetched = last_fetched;
        }
        self.transition(&mut inner, StorePhase::Loaded, None);
        Some(self.commit(&mut inner))
    }

    /// Records a failed full fetch; the snapshot itself is left unchanged.
    ///
    /// Returns `false` when `session` has ended and the failure was ignored.
    pub fn fail_fetch(&self, session: u64, error: &WireError) -> bool {
        let mut inner = self.lock();
        if inner.session != session {
            tracing::debug!(kind = error.kind.as_str(), "ignoring failure of a fetch from an ended session");
            return false;
        }
        tracing::warn!(kind = error.kind.as_str(), message = %error.message, "full fetch failed");
        self.transition(&mut inner, StorePhase::Error, Some(error.clone()));
        true
    }

    fn commit(&self, inner: &mut StoreInner) -> Arc<ApplicationSnapshot> {
        inner.revision += 1;
        inner.snapshot.revision = inner.revision;
        let snapshot = Arc::new(self.with_credentials(&inner.snapshot));
        self.broadcaster.broadcast(&snapshot);
        snapshot
    }

    fn transition(&self, inner: &mut StoreInner, to: StorePhase, error: Option<WireError>) {
        let from = inner.phase;
        if from == to && error.is_none() {
            return;
        }
        inner.phase = to;
        tracing::info!(%from, %to, revision = inner.revision, "store transition");
        let _ = self.events.send(StoreEvent {
            from,
            to,
            revision: inner.revision,
            error,
        });
    }

    fn with_credentials(&self, snapshot: &ApplicationSnapshot) -> ApplicationSnapshot {
        let mut copy = snapshot.clone();
        copy.credentials = self.vault.get();
        copy
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use sync_protocol::{CoordinatorFrame, CredentialExposure, CredentialState, Push};

    use super::*;

    fn store() -> CoordinatorStore {
        CoordinatorStore::new(
            Arc::new(TokenVault::with_credentials(CredentialState::new("a", "r", 100))),
            SyncBroadcaster::new(CredentialExposure::AccessOnly),
        )
    }

    #[test]
    fn set_snapshot_merges_marks_loaded_and_bumps_revision() {
        let store = store();
        let spaces = vec![Space::new("s1", "Home")];

        let snapshot = store.set_snapshot(PartialSnapshot::default().with_spaces(spaces.clone()));

        assert_eq!(snapshot.spaces, spaces);
        assert!(snapshot.initial_data_loaded);
        assert_eq!(snapshot.revision, 1);
        assert_eq!(store.snapshot().spaces, spaces);
        assert_eq!(store.phase(), StorePhase::Loaded);
    }

    #[test]
    fn snapshot_reads_credentials_from_the_vault() {
        let store = store();
        store.vault().set("a2", "r2", 200);
        assert_eq!(store.snapshot().credentials, CredentialState::new("a2", "r2", 200));
    }

    #[test]
    fn reset_yields_defaults_and_an_empty_vault() {
        let store = store();
        store.set_snapshot(PartialSnapshot::default().with_spaces(vec![Space::new("s1", "Home")]));

        let reset = store.reset_on_sign_out();

        assert_eq!(
            *reset,
            ApplicationSnapshot {
                revision: 2,
                ..ApplicationSnapshot::default()
            }
        );
        assert_eq!(store.vault().get(), CredentialState::default());
        assert_eq!(store.phase(), StorePhase::Empty);
    }

    #[test]
    fn every_mutation_is_broadcast_in_order() {
        let store = store();
        let (_subscription, mut receiver) = store.broadcaster().open_channel();

        store.set_snapshot(PartialSnapshot::default().with_spaces(vec![Space::new("s1", "A")]));
        store.set_snapshot(PartialSnapshot::default().with_spaces(vec![Space::new("s2", "B")]));
        store.reset_on_sign_out();

        let mut revisions = Vec::new();
        while let Ok(CoordinatorFrame::Push {
            push: Push::StateUpdated(response),
        }) = receiver.try_recv()
        {
            let snapshot: ApplicationSnapshot = response
                .into_result()
                .expect("push succeeds")
                .expect("push carries data");
            revisions.push(snapshot.revision);
        }
        assert_eq!(revisions, vec![1, 2, 3]);
    }

    #[test]
    fn fetch_lifecycle_emits_transitions() {
        let store = store();
        let mut events = store.subscribe_events();

        let session = store.begin_fetch();
        assert!(store.fail_fetch(session, &WireError::transient("offline")));
        let session = store.begin_fetch();
        store
            .complete_fetch(
                session,
                FetchedState {
                    spaces: vec![Space::new("s1", "Home")],
                    ..FetchedState::default()
                },
            )
            .expect("fetch belongs to the current session");
        store.begin_fetch();

        let phases: Vec<(StorePhase, StorePhase)> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|event| (event.from, event.to))
            .collect();
        assert_eq!(
            phases,
            vec![
                (StorePhase::Empty, StorePhase::Loading),
                (StorePhase::Loading, StorePhase::Error),
                (StorePhase::Error, StorePhase::Loading),
                (StorePhase::Loading, StorePhase::Loaded),
                (StorePhase::Loaded, StorePhase::Refreshing),
            ]
        );
        assert!(store.snapshot().last_fetched.is_some());
    }

    #[test]
    fn needs_fetch_follows_load_state_and_token() {
        let store = store();
        assert!(store.needs_fetch());

        store.set_snapshot(PartialSnapshot::default().with_user(None));
        assert!(store.needs_fetch(), "token present but collections empty");

        store.set_snapshot(PartialSnapshot::default().with_spaces(vec![Space::new("s1", "Home")]));
        assert!(!store.needs_fetch());

        store.vault().clear();
        store.set_snapshot(PartialSnapshot::default().with_spaces(Vec::new()));
        assert!(!store.needs_fetch(), "no token and already loaded");
    }

    #[test]
    fn fetch_settling_after_sign_out_is_discarded() {
        let store = store();
        let (_subscription, mut receiver) = store.broadcaster().open_channel();
        let session = store.begin_fetch();
        store.reset_on_sign_out();

        let installed = store.complete_fetch(
            session,
            FetchedState {
                user: Some(UserIdentity {
                    id: "user-1".to_string(),
                    email: Some("ada@example.com".to_string()),
                    display_name: None,
                }),
                spaces: vec![Space::new("s1", "Home")],
                ..FetchedState::default()
            },
        );

        assert!(installed.is_none());
        let snapshot = store.snapshot();
        assert!(!snapshot.initial_data_loaded);
        assert!(snapshot.spaces.is_empty());
        assert_eq!(snapshot.user, None);
        assert_eq!(store.phase(), StorePhase::Empty);
        assert_eq!(std::iter::from_fn(|| receiver.try_recv().ok()).count(), 1);
    }

    #[test]
    fn failure_from_an_earlier_session_is_ignored() {
        let store = store();
        let session = store.begin_fetch();
        store.record_sign_in(None);

        assert!(!store.fail_fetch(session, &WireError::unauthenticated("token expired")));
        assert_eq!(store.phase(), StorePhase::Loading);
        assert!(store.vault().has_refresh_token());
    }

    #[test]
    fn record_refresh_pushes_the_vault_credentials() {
        let store = store();
        store.set_snapshot(PartialSnapshot::default().with_spaces(vec![Space::new("s1", "Home")]));
        let (_subscription, mut receiver) = store.broadcaster().open_channel();
        store.vault().set("a2", "r2", 200);

        store.record_refresh();

        let Ok(CoordinatorFrame::Push {
            push: Push::StateUpdated(response),
        }) = receiver.try_recv()
        else {
            panic!("refresh was not pushed");
        };
        let snapshot: ApplicationSnapshot = response
            .into_result()
            .expect("push succeeds")
            .expect("push carries data");
        assert_eq!(snapshot.revision, 2);
        assert_eq!(snapshot.credentials.access_token.as_deref(), Some("a2"));
        assert_eq!(snapshot.credentials.expires_at, Some(200));
        assert_eq!(snapshot.credentials.refresh_token, None);
        assert_eq!(snapshot.spaces.len(), 1);
    }
}
