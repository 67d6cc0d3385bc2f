use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sync_protocol::CredentialState;

use crate::error::RefreshError;
use crate::flight::SingleFlight;
use crate::signal::AuthSignals;
use crate::vault::TokenVault;

/// Network exchange of a refresh token for a new credential.
#[async_trait]
pub trait RefreshTransport: Send + Sync + 'static {
    async fn exchange(&self, refresh_token: &str) -> Result<CredentialState, RefreshError>;
}

type RefreshOutcome = Result<CredentialState, RefreshError>;

/// Refreshes the vault's credential with at most one exchange in flight.
pub struct AuthRefresher {
    vault: Arc<TokenVault>,
    transport: Arc<dyn RefreshTransport>,
    timeout: Duration,
    signals: AuthSignals,
    flight: SingleFlight<RefreshOutcome>,
}

impl AuthRefresher {
    pub fn new(
        vault: Arc<TokenVault>,
        transport: Arc<dyn RefreshTransport>,
        timeout: Duration,
        signals: AuthSignals,
    ) -> Self {
        Self {
            vault,
            transport,
            timeout,
            signals,
            flight: SingleFlight::new(),
        }
    }

    /// Refreshes the credential, joining an exchange that is already pending.
    ///
    /// Failures leave the vault untouched and are never retried here.
    pub async fn refresh(&self) -> RefreshOutcome {
        let vault = Arc::clone(&self.vault);
        let transport = Arc::clone(&self.transport);
        let signals = self.signals.clone();
        let timeout = self.timeout;

        self.flight
            .run(move || exchange_once(vault, transport, signals, timeout))
            .await
    }

    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.flight.is_in_flight()
    }

    /// Number of exchanges started over this refresher's lifetime.
    #[must_use]
    pub fn exchanges_started(&self) -> u64 {
        self.flight.started()
    }
}

async fn exchange_once(
    vault: Arc<TokenVault>,
    transport: Arc<dyn RefreshTransport>,
    signals: AuthSignals,
    timeout: Duration,
) -> RefreshOutcome {
    let current = vault.get();
    let Some(refresh_token) = current
        .refresh_token
        .clone()
        .filter(|token| !token.trim().is_empty())
    else {
        return Err(RefreshError::NoRefreshToken);
    };

    tracing::debug!(expires_at = ?current.expires_at, "refreshing access token");
    let exchanged = match tokio::time::timeout(timeout, transport.exchange(&refresh_token)).await {
        Ok(Ok(exchanged)) => exchanged,
        Ok(Err(error)) => {
            tracing::warn!(%error, "token refresh failed");
            return Err(error);
        }
        Err(_) => {
            let after_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            tracing::warn!(after_ms, "token refresh timed out");
            return Err(RefreshError::Timeout { after_ms });
        }
    };

    let next = CredentialState {
        access_token: exchanged.access_token,
        // Providers that do not rotate refresh tokens omit them from the response.
        refresh_token: exchanged.refresh_token.or(Some(refresh_token)),
        expires_at: exchanged.expires_at,
    };

    if vault.replace_if_newer(next.clone()) {
        if let Some(expires_at) = next.expires_at {
            tracing::info!(expires_at, "access token refreshed");
            signals.refreshed(expires_at);
        }
        return Ok(next);
    }

    let stored = vault.get();
    if stored.is_empty() {
        tracing::info!("discarding refresh result for a cleared session");
        return Err(RefreshError::SessionCleared);
    }

    tracing::debug!(
        stale_expires_at = ?next.expires_at,
        stored_expires_at = ?stored.expires_at,
        "discarding stale refresh response"
    );
    Ok(stored)
}
