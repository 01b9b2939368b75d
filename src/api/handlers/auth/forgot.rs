//! Forgot-password endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::email::PasswordResetEmail;

use super::csrf;
use super::errors::{complete, FlowError};
use super::rate_limit::RateLimitAction;
use super::session::{client_session, SessionHandle};
use super::state::AuthState;
use super::storage::{lookup_user_by_email, replace_reset_token};
use super::types::{CsrfResponse, ErrorResponse, ForgotPasswordRequest, ForgotPasswordResponse};
use super::utils::{client_identity, generate_reset_token, hash_reset_token, normalize_email, valid_email};

/// Issue the CSRF token the forgot-password form embeds.
#[utoipa::path(
    get,
    path = "/forgot/password",
    responses(
        (status = 200, description = "Forgot-password form token", body = CsrfResponse)
    ),
    tag = "auth"
)]
pub async fn forgot_password_form(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    csrf::form_token(&headers, &auth_state).await
}

/// Issue a reset token and send the reset email.
///
/// The response is the same whether or not the account exists; token work
/// happens only inside the found branch, invisibly to the caller.
#[utoipa::path(
    post,
    path = "/password/email",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Accepted", body = ForgotPasswordResponse),
        (status = 400, description = "Validation or CSRF failure", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn password_email(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> impl IntoResponse {
    let session = match client_session(&headers) {
        Ok(session) => session,
        Err(err) => return FlowError::Internal(err).into_response_with_csrf(String::new()),
    };
    let result = forgot_flow(&headers, &pool, &auth_state, &session, payload).await;
    complete(&auth_state, &session, result).await
}

async fn forgot_flow(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
    session: &SessionHandle,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> Result<Response, FlowError> {
    let Some(Json(request)) = payload else {
        return Err(FlowError::Validation("Missing payload".to_string()));
    };

    let client = client_identity(headers);
    let budget = state.config().password_email_budget();
    if !state
        .rate_limiter()
        .check_and_increment(
            &RateLimitAction::PasswordEmail.key(&client),
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
        .email
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return Err(FlowError::Validation("Please enter your email".to_string()));
    };

    let email = normalize_email(email);
    if !valid_email(&email) {
        return Err(FlowError::Validation(
            "Please enter a valid email address".to_string(),
        ));
    }

    // From here the response is fixed; account existence must not change it.
    if let Some(user) = lookup_user_by_email(pool, &email).await? {
        let token = generate_reset_token()?;
        let token_hash = hash_reset_token(&token);
        let message = PasswordResetEmail {
            to_email: user.email.clone(),
            reset_url: state.config().reset_url(&token),
        };

        match state.mailer().send_password_reset(&message).await {
            Ok(()) => {
                // Persist only after the email went out; a stored token nobody
                // received cannot be redeemed. Prior live tokens are replaced.
                if let Err(err) = replace_reset_token(
                    pool,
                    &user.email,
                    &token_hash,
                    state.config().reset_token_ttl_seconds(),
                )
                .await
                {
                    error!(
                        "Failed to store password reset token for {}: {err:?}",
                        user.email
                    );
                }
            }
            Err(err) => {
                error!(
                    "CRITICAL: password reset email to {} failed, token not stored: {err:?}",
                    user.email
                );
            }
        }
    }

    let csrf = csrf::issue(state.sessions(), &session.id).await?;
    Ok((
        StatusCode::OK,
        Json(ForgotPasswordResponse { result: 1, csrf }),
    )
        .into_response())
}
