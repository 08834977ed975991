use std::any::Any;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("timed out after {timeout:?} waiting for lock {key}")]
    Timeout { key: String, timeout: Duration },
    #[error("lock backend error: {0}")]
    Backend(#[from] sqlx::Error),
}

pub fn plan_lock_key(project_id: Uuid) -> String {
    format!("plan:{project_id}")
}

pub fn usage_lock_key(project_id: Uuid) -> String {
    format!("usage:{project_id}")
}

/// Exclusive hold on a named lock. The lock is released when the guard is dropped,
/// so every exit path out of a critical section (including `?` and panics) frees it.
pub struct LockGuard {
    key: String,
    _held: Box<dyn Any + Send>,
}

impl LockGuard {
    pub fn new(key: impl Into<String>, held: impl Any + Send) -> Self {
        Self {
            key: key.into(),
            _held: Box::new(held),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        debug!(key = %self.key, "released lock");
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("key", &self.key).finish()
    }
}

#[async_trait]
pub trait LockService: Send + Sync {
    /// Wait up to `timeout` for exclusive ownership of `key`.
    async fn acquire(&self, key: &str, timeout: Duration) -> Result<LockGuard, LockError>;
}

mod memory;
mod postgres;

pub use memory::InMemoryLockService;
pub use postgres::PostgresLockService;
