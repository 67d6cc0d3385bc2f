use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use sync_protocol::{
    AuthCredentials, AuthService, AuthSession, CredentialState, ServiceError, UserIdentity,
};

use crate::script::{lock_unpoisoned, MockOp, Script};

/// Base expiry of issued sessions; the n-th session expires at `MOCK_EXPIRES_AT + n`.
pub const MOCK_EXPIRES_AT: i64 = 4_102_444_800;

#[derive(Debug, Clone)]
struct Account {
    password: String,
    user: UserIdentity,
}

/// In-memory [`AuthService`] keyed by email.
#[derive(Debug, Default)]
pub struct MockAuthService {
    accounts: Mutex<BTreeMap<String, Account>>,
    revoked: Mutex<Vec<String>>,
    reset_requests: Mutex<Vec<String>>,
    issued: AtomicU64,
    require_confirmation: bool,
    script: Script,
}

impl MockAuthService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sign-up returns no session until the address is confirmed.
    #[must_use]
    pub fn requiring_confirmation(mut self) -> Self {
        self.require_confirmation = true;
        self
    }

    #[must_use]
    pub fn with_account(self, email: &str, password: &str) -> Self {
        self.register(email, password);
        self
    }

    pub fn fail_next(&self, op: MockOp, error: ServiceError) {
        self.script.fail_next(op, error);
    }

    pub fn fail_always(&self, op: MockOp, error: ServiceError) {
        self.script.fail_always(op, error);
    }

    #[must_use]
    pub fn calls(&self, op: MockOp) -> usize {
        self.script.calls(op)
    }

    /// Access tokens revoked through `sign_out`.
    #[must_use]
    pub fn revoked_tokens(&self) -> Vec<String> {
        lock_unpoisoned(&self.revoked).clone()
    }

    #[must_use]
    pub fn reset_requests(&self) -> Vec<String> {
        lock_unpoisoned(&self.reset_requests).clone()
    }

    fn register(&self, email: &str, password: &str) -> UserIdentity {
        let mut accounts = lock_unpoisoned(&self.accounts);
        let user = UserIdentity {
            id: format!("user-{}", accounts.len() + 1),
            email: Some(email.to_string()),
            display_name: None,
        };
        accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user: user.clone(),
            },
        );
        user
    }

    fn issue(&self, user: UserIdentity) -> AuthSession {
        let serial = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        AuthSession {
            credentials: CredentialState::new(
                format!("access-{serial}"),
                format!("refresh-{serial}"),
                MOCK_EXPIRES_AT + i64::try_from(serial).unwrap_or(i64::MAX - MOCK_EXPIRES_AT),
            ),
            user: Some(user),
        }
    }
}

fn validate(credentials: &AuthCredentials) -> Result<(), ServiceError> {
    if !credentials.email.contains('@') {
        return Err(ServiceError::Validation("email address is invalid".to_string()));
    }
    if credentials.password.is_empty() {
        return Err(ServiceError::Validation("password is required".to_string()));
    }
    Ok(())
}

#[async_trait]
impl AuthService for MockAuthService {
    async fn sign_in(&self, credentials: &AuthCredentials) -> Result<AuthSession, ServiceError> {
        self.script.enter(MockOp::SignIn).await?;
        validate(credentials)?;

        let account = lock_unpoisoned(&self.accounts)
            .get(&credentials.email)
            .cloned()
            .filter(|account| account.password == credentials.password)
            .ok_or_else(|| ServiceError::Validation("Invalid login credentials".to_string()))?;
        Ok(self.issue(account.user))
    }

    async fn sign_up(
        &self,
        credentials: &AuthCredentials,
    ) -> Result<Option<AuthSession>, ServiceError> {
        self.script.enter(MockOp::SignUp).await?;
        validate(credentials)?;

        if lock_unpoisoned(&self.accounts).contains_key(&credentials.email) {
            return Err(ServiceError::Validation("User already registered".to_string()));
        }
        let user = self.register(&credentials.email, &credentials.password);
        if self.require_confirmation {
            return Ok(None);
        }
        Ok(Some(self.issue(user)))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), ServiceError> {
        self.script.enter(MockOp::SignOut).await?;
        lock_unpoisoned(&self.revoked).push(access_token.to_string());
        Ok(())
    }

    async fn reset_password(&self, email: &str) -> Result<(), ServiceError> {
        self.script.enter(MockOp::ResetPassword).await?;
        if !email.contains('@') {
            return Err(ServiceError::Validation("email address is invalid".to_string()));
        }
        lock_unpoisoned(&self.reset_requests).push(email.to_string());
        Ok(())
    }
}
