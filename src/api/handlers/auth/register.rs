//! Registration endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;

use super::csrf;
use super::errors::{complete, FlowError};
use super::password::hash_password;
use super::session::{client_session, SessionHandle};
use super::state::AuthState;
use super::storage::{insert_user_with_history, RegisterOutcome};
use super::types::{AcceptedResponse, CsrfResponse, ErrorResponse, RegisterRequest};
use super::utils::{normalize_email, valid_email};

/// Issue the CSRF token the registration form embeds.
#[utoipa::path(
    get,
    path = "/register",
    responses(
        (status = 200, description = "Registration form token", body = CsrfResponse)
    ),
    tag = "auth"
)]
pub async fn register_form(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    csrf::form_token(&headers, &auth_state).await
}

/// Create an account.
///
/// Registration is the one flow where enumeration safety is relaxed by
/// design: the uniqueness check necessarily reveals whether an email is
/// taken.
#[utoipa::path(
    post,
    path = "/site/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created", body = AcceptedResponse),
        (status = 400, description = "Validation or CSRF failure", body = ErrorResponse),
        (status = 401, description = "Account conflict", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn site_register(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let session = match client_session(&headers) {
        Ok(session) => session,
        Err(err) => return FlowError::Internal(err).into_response_with_csrf(String::new()),
    };
    let result = register_flow(&pool, &auth_state, &session, payload).await;
    complete(&auth_state, &session, result).await
}

async fn register_flow(
    pool: &PgPool,
    state: &AuthState,
    session: &SessionHandle,
    payload: Option<Json<RegisterRequest>>,
) -> Result<Response, FlowError> {
    let Some(Json(request)) = payload else {
        return Err(FlowError::Validation("Missing payload".to_string()));
    };

    // CSRF first: forged requests do no further work.
    if !csrf::validate(state.sessions(), &session.id, request.csrf_token.as_deref()).await {
        return Err(FlowError::Csrf);
    }

    let Some(name) = request
        .name
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return Err(FlowError::Validation("Please enter your name".to_string()));
    };
    let Some(email) = request
        .email
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return Err(FlowError::Validation("Please enter your email".to_string()));
    };
    let Some(password) = request.password.as_deref().filter(|value| !value.is_empty()) else {
        return Err(FlowError::Validation(
            "Please enter your password".to_string(),
        ));
    };

    let email = normalize_email(email);
    if !valid_email(&email) {
        return Err(FlowError::Validation(
            "Please enter a valid email address".to_string(),
        ));
    }

    let policy = state.config().password_policy();
    if !policy.is_valid(password) {
        return Err(FlowError::Policy(policy.requirements_message()));
    }

    let password_hash = hash_password(password)?;

    match insert_user_with_history(pool, name, &email, &password_hash).await? {
        RegisterOutcome::Created => {
            Ok((StatusCode::OK, Json(AcceptedResponse::new())).into_response())
        }
        RegisterOutcome::Conflict => Err(FlowError::Auth(
            "Unable to create an account with the provided email".to_string(),
        )),
    }
}
