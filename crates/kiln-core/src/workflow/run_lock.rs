//! Per-run execution locks.
//!
//! At most one engine execution may hold the lock for a given run id. A
//! redelivered event for a run that is already executing waits here until
//! the first execution finishes, then replays against the ledger.
//!
//! Entries are removed once nobody holds or waits on them, so the map only
//! ever contains in-flight runs.

use std::sync::Arc;

use dashmap::DashMap;
use kiln_types::workflow::RunId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-run mutexes.
///
/// Cloning produces a shared view of the same registry.
#[derive(Debug, Clone, Default)]
pub struct RunLocks {
    inner: Arc<DashMap<RunId, Arc<Mutex<()>>>>,
}

impl RunLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive execution rights on `run_id`.
    pub async fn acquire(&self, run_id: &RunId) -> RunLockGuard {
        // Clone the Arc out so no DashMap guard is held across the await.
        let lock = self.inner.entry(run_id.clone()).or_default().clone();
        let guard = lock.lock_owned().await;
        RunLockGuard {
            guard: Some(guard),
            run_id: run_id.clone(),
            locks: Arc::clone(&self.inner),
        }
    }

    /// Whether some execution currently holds the lock for `run_id`.
    pub fn is_held(&self, run_id: &RunId) -> bool {
        self.inner
            .get(run_id)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Number of runs with a live lock entry.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Exclusive execution rights on one run. Released on drop.
pub struct RunLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    run_id: RunId,
    locks: Arc<DashMap<RunId, Arc<Mutex<()>>>>,
}

impl RunLockGuard {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map's own reference left: no holder, no waiters.
        self.locks
            .remove_if(&self.run_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_run_is_serialized() {
        let locks = RunLocks::new();
        let run_id = RunId::new("r1");
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let locks = locks.clone();
            let run_id = run_id.clone();
            let active = Arc::clone(&active);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(&run_id).await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_runs_do_not_block() {
        let locks = RunLocks::new();
        let _a = locks.acquire(&RunId::new("a")).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire(&RunId::new("b")))
            .await
            .expect("run b must not wait on run a");
        assert_eq!(b.run_id().as_str(), "b");
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_entry_removed_after_release() {
        let locks = RunLocks::new();
        let run_id = RunId::new("r1");
        {
            let _guard = locks.acquire(&run_id).await;
            assert!(locks.is_held(&run_id));
        }
        assert!(!locks.is_held(&run_id));
        assert!(locks.is_empty());
    }
}
