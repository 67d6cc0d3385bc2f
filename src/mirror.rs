//! Presentation-side replica of the coordinator snapshot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::de::DeserializeOwned;
use sync_protocol::{
    ApplicationSnapshot, AuthCredentials, CoordinatorFrame, CredentialState, PartialSnapshot,
    PasswordReset, Push, Request, RequestFrame, RequestId, Response, WireError,
};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::channel::{write_frame, ChannelError, FrameReader, InboundLine};
use crate::config::DEFAULT_REQUEST_TIMEOUT;

/// What the local UI layer renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorState {
    pub snapshot: ApplicationSnapshot,
    pub is_loading: bool,
    pub error: Option<WireError>,
    pub sign_in_required: bool,
    /// Count of `state-updated` pushes received, stale ones included.
    pub pushes_received: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorConfig {
    pub request_timeout: Duration,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl MirrorConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

type PendingReplies = HashMap<RequestId, oneshot::Sender<Response>>;

struct MirrorShared {
    outbound: mpsc::UnboundedSender<RequestFrame>,
    /// `None` once the channel closed; new requests fail immediately.
    pending: Mutex<Option<PendingReplies>>,
    next_id: AtomicU64,
    state: watch::Sender<MirrorState>,
    request_timeout: Duration,
}

/// Read-only replica of the coordinator snapshot held by a presentation process.
///
/// Every change round-trips through the coordinator; the local snapshot is
/// only ever replaced wholesale from a push or a reply, and never by one with
/// an older revision.
pub struct MirrorStore {
    shared: Arc<MirrorShared>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl MirrorStore {
    /// Attaches to a coordinator over `stream` and requests the initial state.
    pub fn connect<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::connect_with_config(stream, MirrorConfig::default())
    }

    pub fn connect_with_config<S>(stream: S, config: MirrorConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (outbound, queue) = mpsc::unbounded_channel();

        let shared = Arc::new(MirrorShared::new(outbound, config.request_timeout));

        let writer = tokio::spawn(send_requests(write_half, queue));
        let reader = tokio::spawn(read_frames(read_half, Arc::clone(&shared)));

        let initial = Arc::clone(&shared);
        tokio::spawn(async move {
            let _ = initial.load_state().await;
        });

        Self {
            shared,
            reader,
            writer,
        }
    }

    /// Connects to the coordinator's Unix domain socket at `path`.
    #[cfg(unix)]
    pub async fn connect_unix(
        path: impl AsRef<std::path::Path>,
        config: MirrorConfig,
    ) -> Result<Self, ChannelError> {
        let stream = tokio::net::UnixStream::connect(path).await?;
        Ok(Self::connect_with_config(stream, config))
    }

    pub fn subscribe(&self) -> watch::Receiver<MirrorState> {
        self.shared.state.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> ApplicationSnapshot {
        self.shared.state.borrow().snapshot.clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.shared.state.borrow().is_loading
    }

    #[must_use]
    pub fn error(&self) -> Option<WireError> {
        self.shared.state.borrow().error.clone()
    }

    #[must_use]
    pub fn sign_in_required(&self) -> bool {
        self.shared.state.borrow().sign_in_required
    }

    /// Re-reads the coordinator's current state.
    pub async fn load_state(&self) -> Result<(), WireError> {
        self.shared.load_state().await
    }

    /// Asks the coordinator to refetch and waits for the resulting push.
    pub async fn refresh(&self) -> Result<(), WireError> {
        let shared = &self.shared;
        let mut updates = shared.state.subscribe();
        let pushes_before = updates.borrow().pushes_received;

        shared.state.send_modify(|state| state.is_loading = true);
        shared.call_unit(Request::RefreshData).await?;

        let next_push = updates.wait_for(|state| state.pushes_received > pushes_before);
        let waited = tokio::time::timeout(shared.request_timeout, next_push)
            .await
            .map(|pushed| pushed.map(|_| ()));
        match waited {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ChannelError::Closed.into()),
            Err(_) => Err(shared.record_error(
                ChannelError::Timeout {
                    after_ms: millis(shared.request_timeout),
                }
                .into(),
            )),
        }
    }

    /// Proposes a partial update; the merged state arrives as a push.
    pub async fn sync_state(&self, partial: PartialSnapshot) -> Result<(), WireError> {
        self.shared.call_unit(Request::SyncState(partial)).await
    }

    pub async fn sign_in(
        &self,
        credentials: AuthCredentials,
    ) -> Result<Option<CredentialState>, WireError> {
        self.shared.authenticate(Request::SignIn(credentials)).await
    }

    /// `Ok(None)` when the account awaits email confirmation.
    pub async fn sign_up(
        &self,
        credentials: AuthCredentials,
    ) -> Result<Option<CredentialState>, WireError> {
        self.shared.authenticate(Request::SignUp(credentials)).await
    }

    pub async fn sign_out(&self) -> Result<(), WireError> {
        self.shared.call_unit(Request::SignOut).await
    }

    pub async fn reset_password(&self, email: impl Into<String>) -> Result<(), WireError> {
        self.shared
            .call_unit(Request::ResetPassword(PasswordReset {
                email: email.into(),
            }))
            .await
    }

    /// Stops both channel tasks and fails every pending request.
    pub fn close(&self) {
        self.reader.abort();
        self.writer.abort();
        self.shared.shut_down();
    }
}

impl Drop for MirrorStore {
    fn drop(&mut self) {
        self.close();
    }
}

impl MirrorShared {
    fn new(outbound: mpsc::UnboundedSender<RequestFrame>, request_timeout: Duration) -> Self {
        let (state, _receiver) = watch::channel(MirrorState {
            is_loading: true,
            ..MirrorState::default()
        });
        Self {
            outbound,
            pending: Mutex::new(Some(HashMap::new())),
            next_id: AtomicU64::new(0),
            state,
            request_timeout,
        }
    }

    async fn load_state(&self) -> Result<(), WireError> {
        self.state.send_modify(|state| state.is_loading = true);
        match self.call::<ApplicationSnapshot>(Request::GetState).await {
            Ok(Some(snapshot)) => {
                self.apply_snapshot(snapshot);
                Ok(())
            }
            Ok(None) => {
                self.state.send_modify(|state| state.is_loading = false);
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    async fn authenticate(&self, request: Request) -> Result<Option<CredentialState>, WireError> {
        let credentials = self.call::<CredentialState>(request).await?;
        if credentials.is_some() {
            self.state.send_modify(|state| {
                state.sign_in_required = false;
                state.error = None;
            });
        }
        Ok(credentials)
    }

    async fn call_unit(&self, request: Request) -> Result<(), WireError> {
        self.call::<serde_json::Value>(request).await.map(|_| ())
    }

    /// Round-trips `request` and decodes the reply payload, recording failures in the state.
    async fn call<T: DeserializeOwned>(&self, request: Request) -> Result<Option<T>, WireError> {
        let response = match self.round_trip(request).await {
            Ok(response) => response,
            Err(error) => return Err(self.record_error(error.into())),
        };
        response
            .into_result()
            .map_err(|error| self.record_error(error))
    }

    async fn round_trip(&self, request: Request) -> Result<Response, ChannelError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (reply, replied) = oneshot::channel();
        match lock_unpoisoned(&self.pending).as_mut() {
            Some(pending) => {
                pending.insert(id, reply);
            }
            None => return Err(ChannelError::Closed),
        }

        tracing::debug!(id, op = request.op(), "request sent");
        if self.outbound.send(RequestFrame { id, request }).is_err() {
            self.forget(id);
            return Err(ChannelError::Closed);
        }

        match tokio::time::timeout(self.request_timeout, replied).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ChannelError::Closed),
            Err(_) => {
                self.forget(id);
                Err(ChannelError::Timeout {
                    after_ms: millis(self.request_timeout),
                })
            }
        }
    }

    fn forget(&self, id: RequestId) {
        if let Some(pending) = lock_unpoisoned(&self.pending).as_mut() {
            pending.remove(&id);
        }
    }

    fn resolve(&self, id: RequestId, response: Response) {
        let waiter = lock_unpoisoned(&self.pending)
            .as_mut()
            .and_then(|pending| pending.remove(&id));
        match waiter {
            Some(waiter) => {
                let _ = waiter.send(response);
            }
            None => tracing::debug!(id, "reply without a pending request"),
        }
    }

    /// Counts the push and applies its payload in one state update.
    fn receive_push(&self, push: Push) {
        let Push::StateUpdated(response) = push;
        let payload = response.into_result::<ApplicationSnapshot>();
        self.state.send_modify(|state| {
            state.pushes_received += 1;
            match payload {
                Ok(Some(snapshot)) => replace_snapshot(state, snapshot),
                Ok(None) => tracing::debug!("state push without a snapshot"),
                Err(error) => note_error(state, &error),
            }
        });
    }

    fn apply_snapshot(&self, snapshot: ApplicationSnapshot) {
        self.state
            .send_modify(|state| replace_snapshot(state, snapshot));
    }

    fn record_error(&self, error: WireError) -> WireError {
        self.state.send_modify(|state| note_error(state, &error));
        error
    }

    fn shut_down(&self) {
        let dropped = lock_unpoisoned(&self.pending).take();
        if let Some(pending) = dropped {
            tracing::debug!(pending = pending.len(), "mirror channel closed");
        }
    }
}

/// Revision-guarded wholesale replacement.
fn replace_snapshot(state: &mut MirrorState, snapshot: ApplicationSnapshot) {
    state.is_loading = false;
    if snapshot.revision < state.snapshot.revision {
        tracing::debug!(
            stale = snapshot.revision,
            current = state.snapshot.revision,
            "ignoring stale snapshot"
        );
        return;
    }
    state.snapshot = snapshot;
    state.error = None;
}

fn note_error(state: &mut MirrorState, error: &WireError) {
    state.is_loading = false;
    if error.is_unauthenticated() {
        state.sign_in_required = true;
    } else {
        state.error = Some(error.clone());
    }
}

async fn read_frames<S>(read_half: ReadHalf<S>, shared: Arc<MirrorShared>)
where
    S: AsyncRead + AsyncWrite,
{
    let mut reader = FrameReader::new(read_half);
    loop {
        match reader.next_line().await {
            Ok(Some(InboundLine::Frame(text))) => {
                match serde_json::from_str::<CoordinatorFrame>(&text) {
                    Ok(CoordinatorFrame::Reply { id, response }) => shared.resolve(id, response),
                    Ok(CoordinatorFrame::Push { push }) => shared.receive_push(push),
                    Err(error) => tracing::warn!(%error, "dropping malformed coordinator frame"),
                }
            }
            Ok(Some(InboundLine::Oversized { len, .. })) => {
                tracing::warn!(len, "dropping oversized coordinator frame");
            }
            Ok(None) => break,
            Err(error) => {
                tracing::warn!(%error, "coordinator channel read failed");
                break;
            }
        }
    }

    shared.shut_down();
    shared.record_error(ChannelError::Closed.into());
}

async fn send_requests<S>(mut write_half: WriteHalf<S>, mut queue: mpsc::UnboundedReceiver<RequestFrame>)
where
    S: AsyncRead + AsyncWrite,
{
    while let Some(frame) = queue.recv().await {
        if let Err(error) = write_frame(&mut write_half, &frame).await {
            tracing::warn!(%error, "coordinator channel write failed");
            return;
        }
    }
    let _ = write_half.shutdown().await;
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
