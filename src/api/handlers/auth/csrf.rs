//! Per-session anti-forgery tokens.

use anyhow::Result;
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use constant_time_eq::constant_time_eq;

use super::errors::{complete, FlowError};
use super::session::{client_session, SessionStore};
use super::state::AuthState;
use super::types::CsrfResponse;
use super::utils::generate_csrf_token;

pub(super) const CSRF_SESSION_KEY: &str = "csrf_token";

/// Store a fresh token in the session and return it for embedding.
///
/// Issuing again rotates the token; the previous value stops validating.
pub(super) async fn issue(sessions: &dyn SessionStore, session_id: &str) -> Result<String> {
    let token = generate_csrf_token()?;
    sessions.set(session_id, CSRF_SESSION_KEY, &token).await;
    Ok(token)
}

/// True iff the submitted token matches the session's current token.
///
/// Missing session state or a mismatch yields `false`, never an error.
pub(super) async fn validate(
    sessions: &dyn SessionStore,
    session_id: &str,
    submitted: Option<&str>,
) -> bool {
    let Some(submitted) = submitted.map(str::trim).filter(|token| !token.is_empty()) else {
        return false;
    };
    match sessions.get(session_id, CSRF_SESSION_KEY).await {
        Some(stored) => constant_time_eq(stored.as_bytes(), submitted.as_bytes()),
        None => false,
    }
}

/// Shared GET-form behavior: bind a session, issue a token for the form.
pub(super) async fn form_token(headers: &HeaderMap, state: &AuthState) -> Response {
    let session = match client_session(headers) {
        Ok(session) => session,
        Err(err) => return FlowError::Internal(err).into_response_with_csrf(String::new()),
    };
    let result = match issue(state.sessions(), &session.id).await {
        Ok(csrf) => Ok((StatusCode::OK, Json(CsrfResponse { csrf })).into_response()),
        Err(err) => Err(FlowError::Internal(err)),
    };
    complete(state, &session, result).await
}
