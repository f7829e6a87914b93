//! Database helpers for users, sessions and recovery codes.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use tracing::Instrument;

/// Full user row as persisted. `totp_secret` is the sealed blob, never the
/// raw secret.
pub(crate) struct UserRecord {
    pub(crate) id: i64,
    pub(crate) username: String,
    pub(crate) password_hash: Option<String>,
    pub(crate) pin_hash: Option<String>,
    pub(crate) totp_secret: Option<Vec<u8>>,
    pub(crate) mfa_enabled: bool,
    pub(crate) failed_attempts: i64,
    pub(crate) first_failed_at: Option<i64>,
    pub(crate) lock_until: Option<i64>,
}

/// Minimal data resolved from a valid session token.
pub(crate) struct SessionRecord {
    pub(crate) user_id: i64,
    pub(crate) mfa_verified: bool,
}

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        pin_hash: row.get("pin_hash"),
        totp_secret: row.get("totp_secret"),
        mfa_enabled: row.get::<i64, _>("mfa_enabled") != 0,
        failed_attempts: row.get("failed_attempts"),
        first_failed_at: row.get("first_failed_at"),
        lock_until: row.get("lock_until"),
    }
}

/// Create the owner account if the instance has no user yet.
///
/// Returns `None` when a user already exists (setup is one-shot).
pub(super) async fn create_initial_user(
    pool: &SqlitePool,
    username: &str,
    password_hash: Option<&str>,
    pin_hash: Option<&str>,
    now: i64,
) -> Result<Option<i64>> {
    // INSERT..SELECT..WHERE NOT EXISTS keeps the one-user check atomic.
    let query = r"
        INSERT INTO users (username, password_hash, pin_hash, mfa_enabled, failed_attempts, created_at)
        SELECT ?, ?, ?, 0, 0, ?
        WHERE NOT EXISTS (SELECT 1 FROM users)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .bind(password_hash)
        .bind(pin_hash)
        .bind(now)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to insert initial user")?;

    Ok(row.map(|row| row.get("id")))
}

pub(super) async fn lookup_user(pool: &SqlitePool, username: &str) -> Result<Option<UserRecord>> {
    let query = r"
        SELECT id, username, password_hash, pin_hash, totp_secret, mfa_enabled,
               failed_attempts, first_failed_at, lock_until
        FROM users
        WHERE username = ?
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user")?;

    Ok(row.map(|row| user_from_row(&row)))
}

pub(super) async fn lookup_user_by_id(pool: &SqlitePool, user_id: i64) -> Result<Option<UserRecord>> {
    let query = r"
        SELECT id, username, password_hash, pin_hash, totp_secret, mfa_enabled,
               failed_attempts, first_failed_at, lock_until
        FROM users
        WHERE id = ?
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by id")?;

    Ok(row.map(|row| user_from_row(&row)))
}

/// Persist a sealed TOTP secret and flip MFA on in one statement.
pub(super) async fn store_totp_secret(
    pool: &SqlitePool,
    user_id: i64,
    sealed: &[u8],
) -> Result<()> {
    let query = "UPDATE users SET totp_secret = ?, mfa_enabled = 1 WHERE id = ?";
    let span = tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(sealed)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to store TOTP secret")?;
    Ok(())
}

/// Drop the TOTP secret, flip MFA off, and discard unused recovery codes.
pub(super) async fn clear_totp_secret(pool: &SqlitePool, user_id: i64) -> Result<()> {
    let mut tx = pool.begin().await.context("begin MFA disable transaction")?;

    let query = "UPDATE users SET totp_secret = NULL, mfa_enabled = 0 WHERE id = ?";
    let span = tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to clear TOTP secret")?;

    let query = "DELETE FROM recovery_codes WHERE user_id = ? AND used_at IS NULL";
    let span = tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to delete recovery codes")?;

    tx.commit().await.context("commit MFA disable transaction")?;
    Ok(())
}

pub(super) async fn insert_session(
    pool: &SqlitePool,
    user_id: i64,
    mfa_verified: bool,
    now: i64,
    absolute_ttl_seconds: i64,
) -> Result<String> {
    // Generate a random token, store only its hash, and return the raw value
    // so the caller can hand it to the client.
    let query = r"
        INSERT INTO sessions (session_hash, user_id, created_at, last_activity, expires_at, mfa_verified, revoked)
        VALUES (?, ?, ?, ?, ?, ?, 0)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_session_token();
        let token_hash = hash_session_token(&token);
        let result = sqlx::query(query)
            .bind(&token_hash[..])
            .bind(user_id)
            .bind(now)
            .bind(now)
            .bind(now + absolute_ttl_seconds)
            .bind(i64::from(mfa_verified))
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

/// Resolve a session hash, enforcing both expiry rules.
///
/// An expired session is revoked in place; a live one gets its
/// `last_activity` advanced so the idle window slides.
pub(super) async fn get_valid_session(
    pool: &SqlitePool,
    token_hash: &[u8],
    now: i64,
    idle_timeout_seconds: i64,
) -> Result<Option<SessionRecord>> {
    let query = r"
        SELECT user_id, last_activity, expires_at, mfa_verified
        FROM sessions
        WHERE session_hash = ? AND revoked = 0
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let last_activity: i64 = row.get("last_activity");
    let expires_at: i64 = row.get("expires_at");
    if now >= expires_at || now - last_activity > idle_timeout_seconds {
        revoke_session(pool, token_hash).await?;
        return Ok(None);
    }

    let query = "UPDATE sessions SET last_activity = ? WHERE session_hash = ?";
    let span = tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(now)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update session last_activity")?;

    Ok(Some(SessionRecord {
        user_id: row.get("user_id"),
        mfa_verified: row.get::<i64, _>("mfa_verified") != 0,
    }))
}

pub(super) async fn revoke_session(pool: &SqlitePool, token_hash: &[u8]) -> Result<()> {
    // Logout is idempotent; it's fine if no rows change.
    let query = "UPDATE sessions SET revoked = 1 WHERE session_hash = ?";
    let span = tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to revoke session")?;
    Ok(())
}

/// Swap the unused recovery-code batch for a fresh one.
pub(super) async fn replace_recovery_codes(
    pool: &SqlitePool,
    user_id: i64,
    code_hashes: &[String],
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("begin recovery-code transaction")?;

    let query = "DELETE FROM recovery_codes WHERE user_id = ? AND used_at IS NULL";
    let span = tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to delete recovery codes")?;

    let query = "INSERT INTO recovery_codes (user_id, code_hash) VALUES (?, ?)";
    for code_hash in code_hashes {
        let span = tracing::info_span!(
            "db.query",
            db.system = "sqlite",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(code_hash)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert recovery code")?;
    }

    tx.commit().await.context("commit recovery-code transaction")?;
    Ok(())
}

pub(super) async fn list_unused_recovery_codes(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Vec<(i64, String)>> {
    let query = "SELECT id, code_hash FROM recovery_codes WHERE user_id = ? AND used_at IS NULL";
    let span = tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(user_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list recovery codes")?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get("id"), row.get("code_hash")))
        .collect())
}

/// Mark one recovery code used. The `used_at IS NULL` guard makes the
/// consume exactly-once even under concurrent attempts.
pub(super) async fn consume_recovery_code(
    pool: &SqlitePool,
    code_id: i64,
    now: i64,
) -> Result<bool> {
    let query = "UPDATE recovery_codes SET used_at = ? WHERE id = ? AND used_at IS NULL";
    let span = tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(now)
        .bind(code_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to consume recovery code")?;

    Ok(result.rows_affected() == 1)
}

pub(crate) fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub(crate) fn hash_session_token(token: &str) -> Vec<u8> {
    Sha256::digest(token.as_bytes()).to_vec()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err.as_database_error().map(sqlx::error::DatabaseError::kind),
        Some(sqlx::error::ErrorKind::UniqueViolation)
    )
}
