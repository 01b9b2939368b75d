//! Database helpers for users, password history and reset tokens.
//!
//! Multi-statement writes ("invalidate old token + write new token",
//! "update credential + append history") are single transactions; nothing is
//! partially committed.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::utils::is_unique_violation;

/// Outcome when attempting to create a new user.
#[derive(Debug)]
pub(super) enum RegisterOutcome {
    Created,
    Conflict,
}

pub(super) struct UserRecord {
    pub(super) user_id: Uuid,
    pub(super) name: String,
    pub(super) email: String,
    pub(super) password_hash: String,
}

/// Reset token as seen through its digest. Expiry is evaluated by the
/// database clock so all instances agree.
pub(super) struct ResetTokenRecord {
    pub(super) email: String,
    pub(super) expired: bool,
}

pub(super) async fn lookup_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    let query = "SELECT id, name, email, password_hash FROM users WHERE email = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user")?;

    Ok(row.map(|row| UserRecord {
        user_id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
    }))
}

/// Create the user and its first history entry in one transaction.
pub(super) async fn insert_user_with_history(
    pool: &PgPool,
    name: &str,
    email: &str,
    password_hash: &str,
) -> Result<RegisterOutcome> {
    let mut tx = pool.begin().await.context("begin register transaction")?;

    let query = r"
        INSERT INTO users (name, email, password_hash)
        VALUES ($1, $2, $3)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let user_id: Uuid = match row {
        Ok(row) => row.get("id"),
        Err(err) => {
            if is_unique_violation(&err) {
                let _ = tx.rollback().await;
                return Ok(RegisterOutcome::Conflict);
            }
            return Err(err).context("failed to insert user");
        }
    };

    insert_history_entry(&mut tx, user_id, password_hash).await?;

    tx.commit().await.context("commit register transaction")?;

    Ok(RegisterOutcome::Created)
}

async fn insert_history_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    password_hash: &str,
) -> Result<()> {
    let query = r"
        INSERT INTO users_password_history (user_id, password_hash)
        VALUES ($1, $2)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert password history entry")?;
    Ok(())
}

/// All historical credential hashes for a user, oldest first.
pub(super) async fn password_history_hashes(pool: &PgPool, user_id: Uuid) -> Result<Vec<String>> {
    let query = r"
        SELECT password_hash
        FROM users_password_history
        WHERE user_id = $1
        ORDER BY created_at ASC
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(user_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to load password history")?;

    Ok(rows
        .into_iter()
        .map(|row| row.get("password_hash"))
        .collect())
}

/// Replace any live token for the email with the new digest. At most one
/// live token exists per email.
pub(super) async fn replace_reset_token(
    pool: &PgPool,
    email: &str,
    token_hash: &[u8],
    ttl_seconds: i64,
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("begin reset-token transaction")?;

    delete_tokens_for_email(&mut tx, email).await?;

    let query = r"
        INSERT INTO users_password_reset_tokens (email, token_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .bind(token_hash)
        .bind(ttl_seconds)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert reset token")?;

    tx.commit().await.context("commit reset-token transaction")
}

async fn delete_tokens_for_email(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    email: &str,
) -> Result<()> {
    let query = "DELETE FROM users_password_reset_tokens WHERE email = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to delete reset tokens for email")?;
    Ok(())
}

pub(super) async fn lookup_reset_token(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<ResetTokenRecord>> {
    let query = r"
        SELECT email, expires_at <= NOW() AS expired
        FROM users_password_reset_tokens
        WHERE token_hash = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup reset token")?;

    Ok(row.map(|row| ResetTokenRecord {
        email: row.get("email"),
        expired: row.get("expired"),
    }))
}

/// Consume a token by digest (single-use, also applied on expiry detection).
pub(super) async fn delete_reset_token(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    let query = "DELETE FROM users_password_reset_tokens WHERE token_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete reset token")?;
    Ok(())
}

/// Finalize a reset: drop every live token for the email, swap the
/// credential, append history. One transaction.
pub(super) async fn apply_password_reset(
    pool: &PgPool,
    user_id: Uuid,
    email: &str,
    new_password_hash: &str,
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("begin password-reset transaction")?;

    delete_tokens_for_email(&mut tx, email).await?;

    let query = r"
        UPDATE users
        SET password_hash = $2,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(new_password_hash)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to update credential hash")?;

    insert_history_entry(&mut tx, user_id, new_password_hash).await?;

    tx.commit()
        .await
        .context("commit password-reset transaction")
}
