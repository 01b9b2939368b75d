//! Small helpers for auth validation and token handling.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Entropy for reset tokens, CSRF tokens and session identifiers.
const TOKEN_BYTES: usize = 32;

/// Normalize an email for lookup/uniqueness checks.
pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(super) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

fn random_token(what: &str) -> Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .with_context(|| format!("failed to generate {what}"))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Create a new password-reset token for email links.
///
/// The returned token is only sent to the user; we store a hash in the
/// database.
pub(super) fn generate_reset_token() -> Result<String> {
    random_token("reset token")
}

/// Create a new anti-forgery token bound to the session.
pub(super) fn generate_csrf_token() -> Result<String> {
    random_token("csrf token")
}

/// Create a new opaque session identifier for the auth cookie.
pub(super) fn generate_session_id() -> Result<String> {
    random_token("session id")
}

/// Hash a reset token so we never store the raw token in the database.
/// Lookups compare digest to digest.
pub(super) fn hash_reset_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Extract a client IP for rate limiting from common proxy headers.
pub(super) fn extract_client_ip(headers: &axum::http::HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Rate-limit identity: the client IP, or a shared bucket when no proxy
/// header is present.
pub(super) fn client_identity(headers: &axum::http::HeaderMap) -> String {
    extract_client_ip(headers).unwrap_or_else(|| "unknown".to_string())
}
