use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use sync_protocol::{ApplicationSnapshot, CoordinatorFrame, CredentialExposure, Push, Response};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identity of one connected presentation process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(Uuid);

impl ChannelId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Outbound queue of one channel, shared by replies and pushes.
pub type FrameSender = mpsc::UnboundedSender<CoordinatorFrame>;
pub type FrameReceiver = mpsc::UnboundedReceiver<CoordinatorFrame>;

/// Fans snapshots out to every connected channel.
///
/// Each channel owns one unbounded FIFO queue, so pushes reach a channel in the
/// order `broadcast` was called. A channel whose queue is closed is pruned on
/// the next broadcast without affecting the others.
pub struct SyncBroadcaster {
    channels: Mutex<BTreeMap<ChannelId, FrameSender>>,
    exposure: CredentialExposure,
}

impl SyncBroadcaster {
    pub fn new(exposure: CredentialExposure) -> Arc<Self> {
        Arc::new(Self {
            channels: Mutex::new(BTreeMap::new()),
            exposure,
        })
    }

    #[must_use]
    pub fn exposure(&self) -> CredentialExposure {
        self.exposure
    }

    /// Registers `sender` as the outbound queue of `channel_id`.
    ///
    /// Re-subscribing an id replaces its previous queue.
    pub fn subscribe(self: &Arc<Self>, channel_id: ChannelId, sender: FrameSender) -> Subscription {
        lock_unpoisoned(&self.channels).insert(channel_id, sender);
        tracing::debug!(%channel_id, "channel subscribed");
        Subscription {
            channel_id,
            broadcaster: Arc::downgrade(self),
            active: true,
        }
    }

    /// Opens a fresh channel and returns its subscription plus the receiving end of its queue.
    pub fn open_channel(self: &Arc<Self>) -> (Subscription, FrameReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (self.subscribe(ChannelId::new(), sender), receiver)
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        lock_unpoisoned(&self.channels).len()
    }

    #[must_use]
    pub fn is_subscribed(&self, channel_id: ChannelId) -> bool {
        lock_unpoisoned(&self.channels).contains_key(&channel_id)
    }

    /// Copy of `snapshot` allowed to leave the coordinator under the exposure policy.
    #[must_use]
    pub fn sanitize(&self, snapshot: &ApplicationSnapshot) -> ApplicationSnapshot {
        snapshot.sanitized(self.exposure)
    }

    /// Pushes `snapshot` to every channel and returns how many accepted it.
    pub fn broadcast(&self, snapshot: &ApplicationSnapshot) -> usize {
        let frame = CoordinatorFrame::Push {
            push: Push::StateUpdated(Response::ok_with(&self.sanitize(snapshot))),
        };

        let mut channels = lock_unpoisoned(&self.channels);
        let mut closed = Vec::new();
        for (channel_id, sender) in channels.iter() {
            if sender.send(frame.clone()).is_err() {
                closed.push(*channel_id);
            }
        }
        for channel_id in &closed {
            channels.remove(channel_id);
            tracing::debug!(%channel_id, "pruned closed channel");
        }

        let delivered = channels.len();
        tracing::debug!(revision = snapshot.revision, delivered, "state broadcast");
        delivered
    }

    fn unsubscribe(&self, channel_id: ChannelId) {
        if lock_unpoisoned(&self.channels).remove(&channel_id).is_some() {
            tracing::debug!(%channel_id, "channel unsubscribed");
        }
    }
}

/// Registration handle of one channel; dropping it detaches the channel.
#[derive(Debug)]
pub struct Subscription {
    channel_id: ChannelId,
    broadcaster: Weak<SyncBroadcaster>,
    active: bool,
}

impl Subscription {
    #[must_use]
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(broadcaster) = self.broadcaster.upgrade() {
            broadcaster.unsubscribe(self.channel_id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
