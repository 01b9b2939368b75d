//! Login and logout endpoints.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;

use super::csrf;
use super::errors::{complete, FlowError};
use super::password::verify_password;
use super::rate_limit::RateLimitAction;
use super::session::{
    clear_session_cookie, client_session, SessionHandle, USER_EMAIL_KEY, USER_ID_KEY, USER_NAME_KEY,
};
use super::state::AuthState;
use super::storage::lookup_user_by_email;
use super::types::{CsrfResponse, ErrorResponse, LoginOkResponse, LoginRequest};
use super::utils::{client_identity, normalize_email, valid_email};

/// Issue the CSRF token the login form embeds.
#[utoipa::path(
    get,
    path = "/login",
    responses(
        (status = 200, description = "Login form token", body = CsrfResponse)
    ),
    tag = "auth"
)]
pub async fn login_form(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    csrf::form_token(&headers, &auth_state).await
}

/// Authenticate and establish a session.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = LoginOkResponse),
        (status = 400, description = "Validation or CSRF failure", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn auth_login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let session = match client_session(&headers) {
        Ok(session) => session,
        Err(err) => return FlowError::Internal(err).into_response_with_csrf(String::new()),
    };
    let result = login_flow(&headers, &pool, &auth_state, &session, payload).await;
    complete(&auth_state, &session, result).await
}

async fn login_flow(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
    session: &SessionHandle,
    payload: Option<Json<LoginRequest>>,
) -> Result<Response, FlowError> {
    let Some(Json(request)) = payload else {
        return Err(FlowError::Validation("Missing payload".to_string()));
    };

    // Rate limit before anything else; forged and malformed requests still
    // consume budget.
    let client = client_identity(headers);
    let budget = state.config().login_budget();
    if !state
        .rate_limiter()
        .check_and_increment(
            &RateLimitAction::Login.key(&client),
            budget.limit,
            budget.window_seconds,
        )
        .await
    {
        return Err(FlowError::RateLimit);
    }

    if !csrf::validate(state.sessions(), &session.id, request.csrf_token.as_deref()).await {
        return Err(FlowError::Csrf);
    }

    let Some(email) = request
        .login
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

    // Structural check before touching the store; anything failing policy
    // cannot be a stored credential.
    let policy = state.config().password_policy();
    if !policy.is_valid(password) {
        return Err(FlowError::Policy(policy.requirements_message()));
    }

    let user = lookup_user_by_email(pool, &email).await?;
    // One message for unknown email and wrong password; the hasher's fixed
    // cost keeps the two from being cheaply distinguishable.
    let verified = user
        .as_ref()
        .is_some_and(|user| verify_password(password, &user.password_hash));
    let Some(user) = user.filter(|_| verified) else {
        return Err(FlowError::Auth("Invalid credentials".to_string()));
    };

    let sessions = state.sessions();
    sessions
        .set(&session.id, USER_ID_KEY, &user.user_id.to_string())
        .await;
    sessions.set(&session.id, USER_NAME_KEY, &user.name).await;
    sessions
        .set(&session.id, USER_EMAIL_KEY, &user.email)
        .await;

    // Fresh token after authentication; the pre-login token stops working.
    let csrf = csrf::issue(sessions, &session.id).await?;

    Ok((
        StatusCode::OK,
        Json(LoginOkResponse {
            result: 1,
            url: state.config().login_redirect().to_string(),
            csrf,
        }),
    )
        .into_response())
}

/// Clear the session and return to the landing page.
#[utoipa::path(
    get,
    path = "/logout",
    responses(
        (status = 303, description = "Session cleared, redirect to landing page")
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    if let Ok(session) = client_session(&headers) {
        if !session.is_new {
            auth_state.sessions().clear(&session.id).await;
        }
    }

    // Always clear the cookie, even if there was no session to drop.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (response_headers, Redirect::to("/")).into_response()
}
