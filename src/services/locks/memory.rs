use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use super::{LockError, LockGuard, LockService};

type LockTable = DashMap<String, Arc<Mutex<()>>>;

/// Process-local locks, one async mutex per key. Suitable for a single backend
/// instance and for tests.
///
/// A key's entry lives only while someone holds or waits on it.
#[derive(Clone, Default)]
pub struct InMemoryLockService {
    locks: Arc<LockTable>,
}

impl InMemoryLockService {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.locks.len()
    }
}

/// Drops the entry when the table holds the last reference to its mutex.
fn evict_if_idle(locks: &LockTable, key: &str) {
    locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
}

struct HeldEntry {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockTable>,
    key: String,
}

impl Drop for HeldEntry {
    fn drop(&mut self) {
        // Unlock first so the guard's reference to the mutex is gone.
        self.guard.take();
        evict_if_idle(&self.locks, &self.key);
    }
}

#[async_trait]
impl LockService for InMemoryLockService {
    async fn acquire(&self, key: &str, timeout: Duration) -> Result<LockGuard, LockError> {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        // The pending acquire owns a clone of the mutex; it is gone once this returns.
        let acquired = tokio::time::timeout(timeout, lock.lock_owned()).await;
        match acquired {
            Ok(guard) => {
                debug!(key, "acquired lock");
                let held = HeldEntry {
                    guard: Some(guard),
                    locks: self.locks.clone(),
                    key: key.to_string(),
                };
                Ok(LockGuard::new(key, held))
            }
            Err(_) => {
                evict_if_idle(&self.locks, key);
                warn!(key, ?timeout, "lock acquisition timed out");
                Err(LockError::Timeout {
                    key: key.to_string(),
                    timeout,
                })
            }
        }
    }
}
