use std::sync::{Mutex, MutexGuard};

use sync_protocol::CredentialState;

use crate::config::DEFAULT_EXPIRY_BUFFER_SECS;

/// In-memory holder of the access/refresh tokens and their expiry.
#[derive(Debug, Default)]
pub struct TokenVault {
    state: Mutex<CredentialState>,
}

impl TokenVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(state: CredentialState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    #[must_use]
    pub fn get(&self) -> CredentialState {
        self.lock().clone()
    }

    pub fn set(&self, access: impl Into<String>, refresh: impl Into<String>, expires_at: i64) {
        self.replace(CredentialState::new(access, refresh, expires_at));
    }

    /// Unconditionally installs `state`, as a sign-in does.
    pub fn replace(&self, state: CredentialState) {
        *self.lock() = state;
    }

    /// Installs `next` only when it strictly extends the stored expiry.
    ///
    /// A cleared vault never accepts a refresh result, so a refresh settling
    /// after sign-out cannot resurrect the session.
    pub fn replace_if_newer(&self, next: CredentialState) -> bool {
        let mut state = self.lock();
        if !state.has_refresh_token() {
            return false;
        }

        let Some(next_expiry) = next.expires_at else {
            return false;
        };
        if state.expires_at.is_some_and(|current| next_expiry <= current) {
            return false;
        }

        *state = next;
        true
    }

    pub fn clear(&self) {
        *self.lock() = CredentialState::default();
    }

    /// True when the expiry is unknown or `now` is inside the buffer before it.
    #[must_use]
    pub fn is_expired(&self, now_epoch: i64, buffer_seconds: i64) -> bool {
        match self.lock().expires_at {
            Some(expires_at) => now_epoch > expires_at.saturating_sub(buffer_seconds),
            None => true,
        }
    }

    #[must_use]
    pub fn is_expired_at(&self, now_epoch: i64) -> bool {
        self.is_expired(now_epoch, DEFAULT_EXPIRY_BUFFER_SECS)
    }

    #[must_use]
    pub fn has_refresh_token(&self) -> bool {
        self.lock().has_refresh_token()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.lock().access_token.clone()
    }

    fn lock(&self) -> MutexGuard<'_, CredentialState> {
        lock_unpoisoned(&self.state)
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPIRES_AT: i64 = 1_700_000_000;

    #[test]
    fn is_expired_honours_the_buffer() {
        let vault = TokenVault::with_credentials(CredentialState::new("a", "r", EXPIRES_AT));

        assert!(vault.is_expired(EXPIRES_AT - 30, 60));
        assert!(!vault.is_expired(EXPIRES_AT - 120, 60));
        assert!(vault.is_expired_at(EXPIRES_AT - 30));
        assert!(!vault.is_expired_at(EXPIRES_AT - 120));
        assert!(!vault.is_expired(EXPIRES_AT - 60, 60));
        assert!(vault.is_expired(EXPIRES_AT + 1, 0));
    }

    #[test]
    fn missing_expiry_counts_as_expired() {
        let vault = TokenVault::new();
        assert!(vault.is_expired(0, 60));
    }

    #[test]
    fn clear_nulls_every_field() {
        let vault = TokenVault::new();
        vault.set("access", "refresh", EXPIRES_AT);
        vault.clear();

        assert_eq!(vault.get(), CredentialState::default());
        assert!(!vault.has_refresh_token());
    }

    #[test]
    fn replace_if_newer_requires_strictly_later_expiry() {
        let vault = TokenVault::with_credentials(CredentialState::new("a1", "r1", EXPIRES_AT));

        assert!(!vault.replace_if_newer(CredentialState::new("a0", "r0", EXPIRES_AT - 10)));
        assert!(!vault.replace_if_newer(CredentialState::new("a1b", "r1b", EXPIRES_AT)));
        assert_eq!(vault.access_token().as_deref(), Some("a1"));

        assert!(vault.replace_if_newer(CredentialState::new("a2", "r2", EXPIRES_AT + 3600)));
        assert_eq!(vault.get(), CredentialState::new("a2", "r2", EXPIRES_AT + 3600));
    }

    #[test]
    fn replace_if_newer_rejects_results_after_sign_out() {
        let vault = TokenVault::with_credentials(CredentialState::new("a1", "r1", EXPIRES_AT));
        vault.clear();

        assert!(!vault.replace_if_newer(CredentialState::new("a2", "r2", EXPIRES_AT + 3600)));
        assert_eq!(vault.get(), CredentialState::default());
    }
}
