use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use auth_client::SingleFlight;
use sync_protocol::{
    ApplicationSnapshot, AuthCredentials, AuthService, AuthSession, DataService, PartialSnapshot,
    Request, Response, ServiceError, WireError,
};

use crate::config::SyncConfig;
use crate::coordinator::store::{CoordinatorStore, FetchedState};

type FetchOutcome = Result<Arc<ApplicationSnapshot>, WireError>;

/// `Ok(None)` when the session changed before the fetch settled and its result was dropped.
type FlightOutcome = Result<Option<Arc<ApplicationSnapshot>>, WireError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchMode {
    Always,
    /// Skips the fetch when the store already holds usable data at flight start.
    IfNeeded,
}

/// Dispatches presentation-process requests against the store and collaborators.
///
/// Every handler answers with a `{success, data?, error?}` envelope; collaborator
/// failures never escape as panics or transport errors.
pub struct RequestRouter {
    store: Arc<CoordinatorStore>,
    data: Arc<dyn DataService>,
    auth: Arc<dyn AuthService>,
    config: SyncConfig,
    fetch: SingleFlight<FlightOutcome>,
    fetches: Arc<AtomicU64>,
}

impl RequestRouter {
    pub fn new(
        store: Arc<CoordinatorStore>,
        data: Arc<dyn DataService>,
        auth: Arc<dyn AuthService>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            data,
            auth,
            config,
            fetch: SingleFlight::new(),
            fetches: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn store(&self) -> &Arc<CoordinatorStore> {
        &self.store
    }

    /// Number of full fetches started over the router's lifetime.
    #[must_use]
    pub fn fetches_started(&self) -> u64 {
        self.fetches.load(Ordering::Acquire)
    }

    pub async fn handle(&self, request: Request) -> Response {
        let op = request.op();
        let response = match request {
            Request::GetState => self.get_state().await,
            Request::RefreshData => self.refresh_data().await,
            Request::SyncState(partial) => self.sync_state(partial),
            Request::SignIn(credentials) => self.sign_in(&credentials).await,
            Request::SignUp(credentials) => self.sign_up(&credentials).await,
            Request::SignOut => self.sign_out().await,
            Request::ResetPassword(reset) => self.reset_password(&reset.email).await,
        };

        match &response.error {
            Some(error) => tracing::debug!(op, kind = error.kind.as_str(), "request failed"),
            None => tracing::debug!(op, "request handled"),
        }
        response
    }

    /// Replies with the snapshot, fetching first when nothing usable is loaded.
    pub async fn get_state(&self) -> Response {
        let snapshot = if self.store.needs_fetch() {
            match self.fetch_flight(FetchMode::IfNeeded).await {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => self.store.snapshot(),
                Err(error) => return Response::failure(error),
            }
        } else {
            self.store.snapshot()
        };
        Response::ok_with(&self.store.broadcaster().sanitize(&snapshot))
    }

    pub async fn refresh_data(&self) -> Response {
        match self.full_fetch().await {
            Ok(_) => Response::ok(),
            Err(error) => Response::failure(error),
        }
    }

    pub fn sync_state(&self, partial: PartialSnapshot) -> Response {
        let snapshot = self.store.set_snapshot(partial);
        tracing::debug!(revision = snapshot.revision, "partial snapshot merged");
        Response::ok()
    }

    pub async fn sign_in(&self, credentials: &AuthCredentials) -> Response {
        match self.auth.sign_in(credentials).await {
            Ok(session) => self.install_session(session).await,
            Err(error) => Response::failure(error.into()),
        }
    }

    pub async fn sign_up(&self, credentials: &AuthCredentials) -> Response {
        match self.auth.sign_up(credentials).await {
            Ok(Some(session)) => self.install_session(session).await,
            Ok(None) => Response::ok(),
            Err(error) => Response::failure(error.into()),
        }
    }

    pub async fn sign_out(&self) -> Response {
        if let Some(access_token) = self.store.vault().access_token() {
            if let Err(error) = self.auth.sign_out(&access_token).await {
                tracing::warn!(%error, "remote sign-out failed, clearing local session anyway");
            }
        }
        self.store.reset_on_sign_out();
        Response::ok()
    }

    pub async fn reset_password(&self, email: &str) -> Response {
        match self.auth.reset_password(email).await {
            Ok(()) => Response::ok(),
            Err(error) => Response::failure(error.into()),
        }
    }

    /// Runs the full fetch, joining one already in flight.
    ///
    /// A fetch dropped because the session changed yields the store's current snapshot.
    pub async fn full_fetch(&self) -> FetchOutcome {
        match self.fetch_flight(FetchMode::Always).await? {
            Some(snapshot) => Ok(snapshot),
            None => Ok(self.store.snapshot()),
        }
    }

    async fn fetch_flight(&self, mode: FetchMode) -> FlightOutcome {
        let store = Arc::clone(&self.store);
        let data = Arc::clone(&self.data);
        let fetches = Arc::clone(&self.fetches);
        let timeout = self.config.fetch_timeout;
        self.fetch
            .run(move || run_full_fetch(store, data, fetches, timeout, mode))
            .await
    }

    async fn install_session(&self, session: AuthSession) -> Response {
        let AuthSession { credentials, user } = session;
        self.store.vault().replace(credentials.clone());
        self.store.record_sign_in(user);
        tracing::info!(expires_at = ?credentials.expires_at, "session installed");

        let mut outcome = self.fetch_flight(FetchMode::Always).await;
        if matches!(outcome, Ok(None)) {
            // Joined a fetch of the previous session.
            outcome = self.fetch_flight(FetchMode::Always).await;
        }
        match outcome {
            Ok(Some(_)) => {}
            Ok(None) => tracing::warn!("session changed again during the initial fetch"),
            Err(error) => {
                tracing::warn!(kind = error.kind.as_str(), message = %error.message, "initial fetch after sign-in failed");
            }
        }
        Response::ok_with(&credentials.sanitized(self.store.broadcaster().exposure()))
    }
}

async fn run_full_fetch(
    store: Arc<CoordinatorStore>,
    data: Arc<dyn DataService>,
    fetches: Arc<AtomicU64>,
    timeout: Duration,
    mode: FetchMode,
) -> FlightOutcome {
    if mode == FetchMode::IfNeeded && !store.needs_fetch() {
        return Ok(Some(store.snapshot()));
    }
    fetches.fetch_add(1, Ordering::AcqRel);

    let session = store.begin_fetch();
    let outcome = match tokio::time::timeout(timeout, fetch_everything(data.as_ref())).await {
        Ok(result) => result.map_err(WireError::from),
        Err(_) => Err(WireError::transient(format!(
            "full fetch timed out after {} ms",
            timeout.as_millis()
        ))),
    };

    match outcome {
        Ok(fetched) => {
            let active_space_id = fetched.active_space.as_ref().map(|space| space.id.clone());
            let Some(snapshot) = store.complete_fetch(session, fetched) else {
                return Ok(None);
            };
            if let Some(space_id) = active_space_id {
                touch_active_space(data.as_ref(), &space_id, timeout).await;
            }
            Ok(Some(snapshot))
        }
        Err(error) => {
            if store.fail_fetch(session, &error) && error.is_unauthenticated() {
                store.reset_on_sign_out();
            }
            Err(error)
        }
    }
}

/// Best-effort `last_used_at` bump, bounded by the fetch timeout.
async fn touch_active_space(data: &dyn DataService, space_id: &str, timeout: Duration) {
    match tokio::time::timeout(timeout, data.touch_space(space_id)).await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => tracing::warn!(%error, %space_id, "touch_space failed"),
        Err(_) => tracing::warn!(%space_id, ?timeout, "touch_space timed out"),
    }
}

/// User, spaces and active space concurrently; then conversations of the active
/// space; then the messages of those conversations.
async fn fetch_everything(data: &dyn DataService) -> Result<FetchedState, ServiceError> {
    let (user, spaces, active_space) = tokio::try_join!(
        data.fetch_user(),
        data.fetch_spaces(),
        data.fetch_active_space()
    )?;

    let conversations = match &active_space {
        Some(space) => data.fetch_conversations(&space.id).await?,
        None => Vec::new(),
    };
    let conversation_ids: Vec<String> = conversations
        .iter()
        .map(|conversation| conversation.id.clone())
        .collect();
    let messages = if conversation_ids.is_empty() {
        Vec::new()
    } else {
        data.fetch_messages(&conversation_ids).await?
    };

    Ok(FetchedState {
        user,
        spaces,
        active_space,
        conversations,
        messages,
    })
}
