//! Bounds how many pull jobs the Manager (and, symmetrically, the Agent's
//! own snapshot-serving tasks) may run at the same time.
//!
//! Both binaries hand every unit of concurrent work — one pull per due
//! agent, one response per inbound connection — through the same
//! [`TaskScheduler`] so a burst of due agents or inbound connections can
//! never outrun a configured ceiling.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// A semaphore-backed spawner: `limit` permits are handed out to tasks
/// submitted via [`TaskScheduler::spawn`], and a task blocks until one frees
/// up rather than running unbounded.
#[derive(Debug, Clone)]
pub struct TaskScheduler {
    permits: Arc<Semaphore>,
    limit: NonZeroUsize,
}

impl TaskScheduler {
    /// Builds a scheduler that allows at most `limit` tasks to run at once.
    #[must_use]
    pub fn new(limit: NonZeroUsize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limit.get())),
            limit,
        }
    }

    /// The concurrency ceiling this scheduler was built with.
    #[must_use]
    pub const fn limit(&self) -> NonZeroUsize {
        self.limit
    }

    /// Spawns `future` on the tokio runtime, holding one permit for its
    /// duration. Callers that need the result can `.await` the returned
    /// handle; a dropped handle still runs the task to completion.
    pub fn spawn<F, T>(&self, future: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .expect("scheduler semaphore is never closed");
            future.await
        })
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(32).expect("32 is non-zero"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn caps_concurrent_tasks_at_the_configured_limit() {
        let scheduler = TaskScheduler::new(NonZeroUsize::new(2).unwrap());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                scheduler.spawn(async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(15)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn a_dropped_handle_still_runs_its_task() {
        let scheduler = TaskScheduler::default();
        let ran = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&ran);

        drop(scheduler.spawn(async move {
            flag.fetch_add(1, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
