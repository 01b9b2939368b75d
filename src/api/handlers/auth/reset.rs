//! Reset-password endpoints: token view and credential change.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::csrf;
use super::errors::{complete, FlowError};
use super::password::{hash_password, verify_password};
use super::rate_limit::RateLimitAction;
use super::session::{client_session, SessionHandle};
use super::state::AuthState;
use super::storage::{
    apply_password_reset, delete_reset_token, lookup_reset_token, lookup_user_by_email,
    password_history_hashes,
};
use super::types::{AcceptedResponse, ChangePasswordRequest, CsrfResponse, ErrorResponse};
use super::utils::{client_identity, hash_reset_token, normalize_email, valid_email};

/// Shared message for every non-expiry token failure; "not found" and
/// "belongs to another email" must be indistinguishable.
const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired reset token";

/// Outcome of presenting a reset token, consumed by the caller to pick a
/// response.
#[derive(Debug, PartialEq, Eq)]
enum ResetTokenView {
    Valid,
    NotFound,
    Expired,
}

async fn view_reset_token(pool: &PgPool, token: &str) -> anyhow::Result<ResetTokenView> {
    let token = token.trim();
    if token.is_empty() {
        return Ok(ResetTokenView::NotFound);
    }
    let token_hash = hash_reset_token(token);
    match lookup_reset_token(pool, &token_hash).await? {
        None => Ok(ResetTokenView::NotFound),
        Some(record) if record.expired => {
            // Single-use: expiry detection consumes the token.
            delete_reset_token(pool, &token_hash).await?;
            Ok(ResetTokenView::Expired)
        }
        Some(_) => Ok(ResetTokenView::Valid),
    }
}

/// Validate the emailed token and issue the form token, or bounce to the
/// landing page without detail.
#[utoipa::path(
    get,
    path = "/password/reset/{token}",
    params(
        ("token" = String, Path, description = "Raw reset token from the emailed link")
    ),
    responses(
        (status = 200, description = "Token is valid, form token issued", body = CsrfResponse),
        (status = 303, description = "Token missing, unknown or expired")
    ),
    tag = "auth"
)]
pub async fn reset_password_form(
    Path(token): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    match view_reset_token(&pool, &token).await {
        Ok(ResetTokenView::Valid) => csrf::form_token(&headers, &auth_state).await,
        Ok(ResetTokenView::NotFound | ResetTokenView::Expired) => Redirect::to("/").into_response(),
        Err(err) => {
            error!("Failed to check reset token: {err:?}");
            // Errors leak nothing either; the safe default is the landing page.
            Redirect::to("/").into_response()
        }
    }
}

/// Consume the token and set the new credential.
#[utoipa::path(
    post,
    path = "/password/change",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Credential updated", body = AcceptedResponse),
        (status = 400, description = "Validation, CSRF, expiry or reuse failure", body = ErrorResponse),
        (status = 401, description = "Invalid or foreign reset token", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn password_change(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> impl IntoResponse {
    let session = match client_session(&headers) {
        Ok(session) => session,
        Err(err) => return FlowError::Internal(err).into_response_with_csrf(String::new()),
    };
    let result = change_flow(&headers, &pool, &auth_state, &session, payload).await;
    complete(&auth_state, &session, result).await
}

async fn change_flow(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
    session: &SessionHandle,
    payload: Option<Json<ChangePasswordRequest>>,
) -> Result<Response, FlowError> {
    let Some(Json(request)) = payload else {
        return Err(FlowError::Validation("Missing payload".to_string()));
    };

    let client = client_identity(headers);
    let budget = state.config().password_change_budget();
    if !state
        .rate_limiter()
        .check_and_increment(
            &RateLimitAction::PasswordChange.key(&client),
            budget.limit,
            budget.window_seconds,
        )
        .await
    {
        return Err(FlowError::RateLimit);
    }

    let Some(token) = request
        .token
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return Err(FlowError::Validation("Missing reset token".to_string()));
    };

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

    let token_hash = hash_reset_token(token);
    let record = lookup_reset_token(pool, &token_hash).await?;
    // Unknown tokens and tokens issued for another email share one message.
    let Some(record) = record.filter(|record| record.email == email) else {
        return Err(FlowError::Auth(INVALID_TOKEN_MESSAGE.to_string()));
    };

    if record.expired {
        delete_reset_token(pool, &token_hash).await?;
        // Expiry gets its own message; it reveals nothing about account
        // existence.
        return Err(FlowError::Validation(
            "The reset token has expired".to_string(),
        ));
    }

    let Some(user) = lookup_user_by_email(pool, &email).await? else {
        return Err(FlowError::Auth(INVALID_TOKEN_MESSAGE.to_string()));
    };

    let policy = state.config().password_policy();
    if !policy.is_valid(password) {
        return Err(FlowError::Policy(policy.requirements_message()));
    }

    // A reset may never reuse the current credential or any historical one.
    let mut reused = verify_password(password, &user.password_hash);
    if !reused {
        for old_hash in password_history_hashes(pool, user.user_id).await? {
            if verify_password(password, &old_hash) {
                reused = true;
                break;
            }
        }
    }
    if reused {
        return Err(FlowError::Policy(
            "A previously used password cannot be reused. Please choose a new password."
                .to_string(),
        ));
    }

    let new_password_hash = hash_password(password)?;
    apply_password_reset(pool, user.user_id, &user.email, &new_password_hash).await?;

    Ok((StatusCode::OK, Json(AcceptedResponse::new())).into_response())
}
