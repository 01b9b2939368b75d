//! Flow error taxonomy and the orchestrator response boundary.
//!
//! Flows return `Result<Response, FlowError>`; everything is mapped to the
//! uniform envelope here, and no internal detail crosses this boundary.

use axum::{
    http::{header::SET_COOKIE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use super::csrf;
use super::session::{session_cookie, SessionHandle};
use super::state::AuthState;
use super::types::ErrorResponse;

#[derive(Debug)]
pub(super) enum FlowError {
    /// Missing or malformed field.
    Validation(String),
    /// Missing or mismatched anti-forgery token.
    Csrf,
    /// Per-key budget exhausted.
    RateLimit,
    /// Bad credentials, or an invalid/foreign reset token. The message is
    /// shared across internal causes on enumeration-sensitive paths.
    Auth(String),
    /// Password rejected by policy or reuse rules.
    Policy(String),
    /// Store or transport failure; logged in full, surfaced generically.
    Internal(anyhow::Error),
}

impl FlowError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Csrf | Self::Policy(_) => StatusCode::BAD_REQUEST,
            Self::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Validation(message) | Self::Auth(message) | Self::Policy(message) => {
                message.clone()
            }
            Self::Csrf => "Invalid CSRF token".to_string(),
            Self::RateLimit => "Too many attempts, please try again later".to_string(),
            Self::Internal(_) => "An error occurred while processing the request".to_string(),
        }
    }

    pub(super) fn into_response_with_csrf(self, csrf: String) -> Response {
        if let Self::Internal(err) = &self {
            // Full detail stays server-side.
            error!("Internal error: {err:?}");
        }
        let status = self.status();
        let body = ErrorResponse {
            error: self.message(),
            csrf,
        };
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for FlowError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

/// Finish a flow: rotate the CSRF token into error envelopes and attach the
/// session cookie when this request minted the session.
pub(super) async fn complete(
    state: &AuthState,
    session: &SessionHandle,
    result: Result<Response, FlowError>,
) -> Response {
    let mut response = match result {
        Ok(response) => response,
        Err(err) => {
            let csrf = match csrf::issue(state.sessions(), &session.id).await {
                Ok(token) => token,
                Err(issue_err) => {
                    error!("Failed to rotate CSRF token: {issue_err:?}");
                    String::new()
                }
            };
            err.into_response_with_csrf(csrf)
        }
    };

    if session.is_new {
        if let Ok(cookie) = session_cookie(state.config(), &session.id) {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
    }

    response
}
