use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::refresher::AuthRefresher;
use crate::vault::TokenVault;

/// Longest single sleep; the deadline is re-read from the vault after each wake.
const MAX_IDLE: Duration = Duration::from_secs(30);

/// Background task refreshing the credential shortly before it expires.
///
/// The task re-reads the vault after every wake, so refreshes triggered by
/// requests or a new sign-in move its deadline. It stops after the first failed
/// refresh; requests then fall back to the lazy expiry check. Dropping the
/// scheduler aborts the task.
pub struct RefreshScheduler {
    handle: JoinHandle<()>,
}

impl RefreshScheduler {
    pub fn spawn(
        vault: Arc<TokenVault>,
        refresher: Arc<AuthRefresher>,
        clock: Arc<dyn Clock>,
        buffer_seconds: i64,
    ) -> Self {
        let handle = tokio::spawn(run(vault, refresher, clock, buffer_seconds));
        Self { handle }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(
    vault: Arc<TokenVault>,
    refresher: Arc<AuthRefresher>,
    clock: Arc<dyn Clock>,
    buffer_seconds: i64,
) {
    loop {
        let credentials = vault.get();
        let Some(expires_at) = credentials
            .expires_at
            .filter(|_| credentials.has_refresh_token())
        else {
            tokio::time::sleep(MAX_IDLE).await;
            continue;
        };

        let remaining = expires_at
            .saturating_sub(buffer_seconds)
            .saturating_sub(clock.now_epoch_seconds());
        if remaining > 0 {
            let wait = Duration::from_secs(u64::try_from(remaining).unwrap_or(u64::MAX));
            tokio::time::sleep(wait.min(MAX_IDLE)).await;
            continue;
        }

        match refresher.refresh().await {
            Ok(refreshed) => {
                tracing::debug!(expires_at = ?refreshed.expires_at, "scheduled refresh completed");
                if refreshed.expires_at == Some(expires_at) {
                    // The provider handed back the same expiry; avoid a hot loop.
                    tokio::time::sleep(MAX_IDLE).await;
                }
            }
            Err(error) => {
                tracing::warn!(%error, "scheduled refresh failed, stopping scheduler");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use sync_protocol::CredentialState;

    use super::*;
    use crate::clock::ManualClock;
    use crate::error::RefreshError;
    use crate::refresher::RefreshTransport;
    use crate::signal::AuthSignals;

    struct StepExchange {
        calls: AtomicUsize,
        next_expiry: AtomicI64,
        fail: bool,
    }

    #[async_trait]
    impl RefreshTransport for StepExchange {
        async fn exchange(&self, _refresh_token: &str) -> Result<CredentialState, RefreshError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RefreshError::Network("offline".to_owned()));
            }
            let expires_at = self.next_expiry.fetch_add(1_000, Ordering::SeqCst);
            Ok(CredentialState::new("access", "refresh", expires_at))
        }
    }

    fn setup(fail: bool) -> (Arc<TokenVault>, Arc<StepExchange>, Arc<AuthRefresher>) {
        let vault = Arc::new(TokenVault::with_credentials(CredentialState::new("a", "r", 100)));
        let exchange = Arc::new(StepExchange {
            calls: AtomicUsize::new(0),
            next_expiry: AtomicI64::new(1_000),
            fail,
        });
        let refresher = Arc::new(AuthRefresher::new(
            Arc::clone(&vault),
            Arc::clone(&exchange) as Arc<dyn RefreshTransport>,
            Duration::from_secs(5),
            AuthSignals::new(),
        ));
        (vault, exchange, refresher)
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_once_the_buffer_is_reached() {
        let (vault, exchange, refresher) = setup(false);
        let clock = Arc::new(ManualClock::new(0));
        let scheduler = RefreshScheduler::spawn(
            Arc::clone(&vault),
            refresher,
            Arc::clone(&clock) as Arc<dyn Clock>,
            60,
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 0);

        clock.set(45);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
        assert_eq!(vault.get().expires_at, Some(1_000));
        assert!(scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_a_failed_refresh() {
        let (vault, exchange, refresher) = setup(true);
        let clock = Arc::new(ManualClock::new(90));
        let scheduler =
            RefreshScheduler::spawn(Arc::clone(&vault), refresher, clock as Arc<dyn Clock>, 60);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_running());
        assert_eq!(vault.get(), CredentialState::new("a", "r", 100));
    }
}
