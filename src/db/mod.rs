//! Postgres repositories. Plain functions over executors; transactions are owned by the
//! services.

use std::future::Future;
use std::time::Duration;

use crate::error::{CommerceError, Result};

pub mod carts;
pub mod ledger;
pub mod orders;
pub mod payments;
pub mod provider_events;
pub mod stock;

const UNIQUE_VIOLATION: &str = "23505";
const DEADLOCK_DETECTED: &str = "40P01";
const LOCK_NOT_AVAILABLE: &str = "55P03";
const SERIALIZATION_FAILURE: &str = "40001";

/// Attempts made by [`retry_transient`], first try included.
pub const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_STEP: Duration = Duration::from_millis(50);

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    sqlstate(err).as_deref() == Some(UNIQUE_VIOLATION)
}

/// Deadlocks, lock timeouts and serialization failures.
pub fn is_retryable(err: &sqlx::Error) -> bool {
    matches!(sqlstate(err).as_deref(), Some(DEADLOCK_DETECTED | LOCK_NOT_AVAILABLE | SERIALIZATION_FAILURE))
}

/// Re-runs `op` with linear backoff while it fails with a transient database error.
pub async fn retry_transient<T, F, Fut>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                tracing::warn!(attempt, error = %e, "transient database error, retrying");
                tokio::time::sleep(BACKOFF_STEP * attempt).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Maps a unique violation on insert to `None` so callers can fall back to the existing row.
pub(crate) fn unique_to_none<T>(res: std::result::Result<T, sqlx::Error>) -> Result<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(e) if is_unique_violation(&e) => Ok(None),
        Err(e) => Err(CommerceError::Database(e)),
    }
}
