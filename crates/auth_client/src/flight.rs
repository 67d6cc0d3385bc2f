//! Single-flight execution: concurrent callers share one pending operation.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use futures_util::future::{BoxFuture, FutureExt, Shared};

struct InFlight<T: Clone> {
    generation: u64,
    future: Shared<BoxFuture<'static, T>>,
}

/// Shared pending-operation handle.
///
/// The first caller starts the operation; callers arriving while it is pending
/// await the same output. The handle is cleared once the operation settles, so
/// the next call starts a fresh one.
pub struct SingleFlight<T: Clone> {
    pending: Mutex<Option<InFlight<T>>>,
    generations: AtomicU64,
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(None),
            generations: AtomicU64::new(0),
        }
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the pending operation or starts one with `start`.
    pub async fn run<F, Fut>(&self, start: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (generation, future) = self.join_or_start(start);
        let output = future.await;
        self.settle(generation);
        output
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.lock_pending()
            .as_ref()
            .is_some_and(|in_flight| in_flight.future.peek().is_none())
    }

    /// Number of operations started so far.
    #[must_use]
    pub fn started(&self) -> u64 {
        self.generations.load(Ordering::Acquire)
    }

    fn join_or_start<F, Fut>(&self, start: F) -> (u64, Shared<BoxFuture<'static, T>>)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut pending = self.lock_pending();
        if let Some(in_flight) = pending.as_ref() {
            // A settled handle not yet cleared by its waiters is not joinable.
            if in_flight.future.peek().is_none() {
                return (in_flight.generation, in_flight.future.clone());
            }
        }

        let generation = self.generations.fetch_add(1, Ordering::AcqRel) + 1;
        let future = start().boxed().shared();
        *pending = Some(InFlight {
            generation,
            future: future.clone(),
        });
        (generation, future)
    }

    fn settle(&self, generation: u64) {
        let mut pending = self.lock_pending();
        if pending
            .as_ref()
            .is_some_and(|in_flight| in_flight.generation == generation)
        {
            *pending = None;
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<InFlight<T>>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::SingleFlight;

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let flight = Arc::new(SingleFlight::<u32>::new());
        let executions = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let mut waiters = Vec::new();
        for _ in 0..8 {
            let flight = Arc::clone(&flight);
            let executions = Arc::clone(&executions);
            let release = Arc::clone(&release);
            waiters.push(tokio::spawn(async move {
                flight
                    .run(move || async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        release.notified().await;
                        7
                    })
                    .await
            }));
        }

        while !flight.is_in_flight() {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        release.notify_waiters();

        for waiter in waiters {
            assert_eq!(waiter.await.expect("waiter joins"), 7);
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(flight.started(), 1);
        assert!(!flight.is_in_flight());
    }

    #[tokio::test]
    async fn settled_flight_is_not_reused() {
        let flight = SingleFlight::<u32>::new();

        assert_eq!(flight.run(|| async { 1 }).await, 1);
        assert_eq!(flight.run(|| async { 2 }).await, 2);
        assert_eq!(flight.started(), 2);
    }
}
