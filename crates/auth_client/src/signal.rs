use tokio::sync::broadcast;

const SIGNAL_CAPACITY: usize = 32;

/// Credential lifecycle notifications for the owner of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSignal {
    /// The credential is irrecoverable; the UI must route to sign-in.
    SignInRequired { reason: String },
    /// A refresh installed a credential expiring at `expires_at`.
    Refreshed { expires_at: i64 },
}

/// Publish side of the auth signal channel. Clones share one channel.
#[derive(Debug, Clone)]
pub struct AuthSignals {
    sender: broadcast::Sender<AuthSignal>,
}

impl Default for AuthSignals {
    fn default() -> Self {
        let (sender, _receiver) = broadcast::channel(SIGNAL_CAPACITY);
        Self { sender }
    }
}

impl AuthSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthSignal> {
        self.sender.subscribe()
    }

    pub fn sign_in_required(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(%reason, "sign-in required");
        let _ = self.sender.send(AuthSignal::SignInRequired { reason });
    }

    pub fn refreshed(&self, expires_at: i64) {
        let _ = self.sender.send(AuthSignal::Refreshed { expires_at });
    }
}
