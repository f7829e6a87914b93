//! Persisted failed-attempt tracking and account lockout.
//!
//! Counters live on the user row so a lockout survives restarts. Failures
//! only count toward a lockout while they land inside the rolling window;
//! a failure after a quiet gap starts a fresh window.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::Instrument;

use super::storage::UserRecord;

#[derive(Clone, Copy, Debug)]
pub(crate) struct LockoutPolicy {
    pub(crate) threshold: i64,
    pub(crate) window_seconds: i64,
    pub(crate) duration_seconds: i64,
}

pub(super) fn is_locked(user: &UserRecord, now: i64) -> bool {
    user.lock_until.is_some_and(|until| now < until)
}

/// Record one failed attempt and lock the account when the count inside the
/// window reaches the threshold.
///
/// A single UPDATE with CASE arms over the old row values keeps the
/// read-modify-write race-free across concurrent login attempts.
pub(super) async fn record_failure(
    pool: &SqlitePool,
    user_id: i64,
    policy: LockoutPolicy,
    now: i64,
) -> Result<()> {
    // Locking also resets the counters, so a failure after the lock expires
    // starts from zero instead of immediately re-locking.
    let query = r"
        UPDATE users SET
            lock_until = CASE
                WHEN (CASE
                        WHEN first_failed_at IS NULL OR ?1 - first_failed_at > ?2 THEN 1
                        ELSE failed_attempts + 1
                      END) >= ?3
                THEN ?1 + ?4
                ELSE lock_until
            END,
            first_failed_at = CASE
                WHEN (CASE
                        WHEN first_failed_at IS NULL OR ?1 - first_failed_at > ?2 THEN 1
                        ELSE failed_attempts + 1
                      END) >= ?3
                THEN NULL
                WHEN first_failed_at IS NULL OR ?1 - first_failed_at > ?2 THEN ?1
                ELSE first_failed_at
            END,
            failed_attempts = CASE
                WHEN (CASE
                        WHEN first_failed_at IS NULL OR ?1 - first_failed_at > ?2 THEN 1
                        ELSE failed_attempts + 1
                      END) >= ?3
                THEN 0
                WHEN first_failed_at IS NULL OR ?1 - first_failed_at > ?2 THEN 1
                ELSE failed_attempts + 1
            END
        WHERE id = ?5
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(now)
        .bind(policy.window_seconds)
        .bind(policy.threshold)
        .bind(policy.duration_seconds)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to record login failure")?;
    Ok(())
}

/// Clear the counters after a successful first factor.
pub(super) async fn reset(pool: &SqlitePool, user_id: i64) -> Result<()> {
    let query = r"
        UPDATE users
        SET failed_attempts = 0, first_failed_at = NULL, lock_until = NULL
        WHERE id = ?
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to reset lockout counters")?;
    Ok(())
}
