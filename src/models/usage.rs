use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

pub const USAGE_WINDOW_DAYS: i64 = 30;

/// One accounting window of task consumption. Rows are appended, never recycled:
/// the row with the greatest `window_end` is the live one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Usage {
    pub id: Uuid,
    pub project_id: Uuid,
    pub consumed_tasks: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub window_end: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

pub fn usage_window() -> Duration {
    Duration::days(USAGE_WINDOW_DAYS)
}

/// End of the 30-day window containing `now`, with windows anchored at `cycle_start`.
///
/// Computed in whole seconds so the boundary is stable across calls within the same
/// window and survives a round-trip through the database unchanged.
pub fn next_window_end(cycle_start: OffsetDateTime, now: OffsetDateTime) -> OffsetDateTime {
    let window = usage_window().whole_seconds();
    let now_secs = now.unix_timestamp();
    let elapsed = (now_secs - cycle_start.unix_timestamp()).rem_euclid(window);
    let end = now_secs + (window - elapsed);
    // end > now_secs >= i64::MIN, and stays far inside the representable range for
    // any timestamp Stripe or Postgres will hand us.
    OffsetDateTime::from_unix_timestamp(end).unwrap_or(now + usage_window())
}
