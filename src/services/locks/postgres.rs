use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{LockError, LockGuard, LockService};

const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_millis(250);

/// Cluster-wide locks backed by transaction-scoped advisory locks.
///
/// The guard owns the open transaction that took the advisory lock; dropping it
/// rolls the transaction back, which releases the lock. If the process dies the
/// server ends the session and the lock goes with it.
///
/// Waiters never park on a pooled connection: each attempt is a non-blocking
/// `pg_try_advisory_xact_lock` in a short transaction, and the connection goes back
/// to the pool between attempts.
pub struct PostgresLockService {
    pub pool: PgPool,
}

impl PostgresLockService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// One attempt. `Ok(None)` means another session holds the key.
    async fn try_acquire(&self, key: &str) -> Result<Option<LockGuard>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let locked: bool =
            sqlx::query_scalar("SELECT pg_try_advisory_xact_lock(hashtextextended($1, 0))")
                .bind(key)
                .fetch_one(&mut *tx)
                .await?;

        if locked {
            Ok(Some(LockGuard::new(key, tx)))
        } else {
            // Dropping `tx` rolls back and returns the connection.
            Ok(None)
        }
    }
}

pub(crate) fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

#[async_trait]
impl LockService for PostgresLockService {
    async fn acquire(&self, key: &str, timeout: Duration) -> Result<LockGuard, LockError> {
        let deadline = Instant::now() + timeout;
        let timed_out = || {
            warn!(key, ?timeout, "advisory lock acquisition timed out");
            LockError::Timeout {
                key: key.to_string(),
                timeout,
            }
        };

        let mut backoff = INITIAL_BACKOFF;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(timed_out());
            }

            // Bounds the pool checkout as well as the query.
            match tokio::time::timeout(remaining, self.try_acquire(key)).await {
                Ok(Ok(Some(guard))) => {
                    debug!(key, "acquired advisory lock");
                    return Ok(guard);
                }
                Ok(Ok(None)) => {}
                Ok(Err(sqlx::Error::PoolTimedOut)) => {}
                Ok(Err(err)) => return Err(err.into()),
                Err(_) => return Err(timed_out()),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(backoff.min(remaining)).await;
            backoff = next_backoff(backoff);
        }
    }
}
