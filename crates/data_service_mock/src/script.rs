use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use sync_protocol::ServiceError;

/// Collaborator operations tracked by the mocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    FetchUser,
    FetchSpaces,
    FetchActiveSpace,
    FetchConversations,
    FetchMessages,
    TouchSpace,
    SignIn,
    SignUp,
    SignOut,
    ResetPassword,
}

#[derive(Debug, Default)]
struct ScriptState {
    calls: HashMap<MockOp, usize>,
    next_failures: HashMap<MockOp, VecDeque<ServiceError>>,
    sticky_failures: HashMap<MockOp, ServiceError>,
    delays: HashMap<MockOp, Duration>,
}

/// Call counters plus scripted failures and delays, keyed by operation.
#[derive(Debug, Default)]
pub(crate) struct Script {
    state: Mutex<ScriptState>,
}

impl Script {
    pub(crate) fn fail_next(&self, op: MockOp, error: ServiceError) {
        lock_unpoisoned(&self.state)
            .next_failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    pub(crate) fn fail_always(&self, op: MockOp, error: ServiceError) {
        lock_unpoisoned(&self.state)
            .sticky_failures
            .insert(op, error);
    }

    pub(crate) fn clear_failures(&self) {
        let mut state = lock_unpoisoned(&self.state);
        state.next_failures.clear();
        state.sticky_failures.clear();
    }

    pub(crate) fn set_delay(&self, op: MockOp, delay: Duration) {
        lock_unpoisoned(&self.state).delays.insert(op, delay);
    }

    pub(crate) fn calls(&self, op: MockOp) -> usize {
        lock_unpoisoned(&self.state)
            .calls
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    /// Counts the call, applies any scripted delay and returns a scripted failure.
    pub(crate) async fn enter(&self, op: MockOp) -> Result<(), ServiceError> {
        let (delay, failure) = {
            let mut state = lock_unpoisoned(&self.state);
            *state.calls.entry(op).or_insert(0) += 1;
            let failure = state
                .next_failures
                .get_mut(&op)
                .and_then(VecDeque::pop_front)
                .or_else(|| state.sticky_failures.get(&op).cloned());
            (state.delays.get(&op).copied(), failure)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
