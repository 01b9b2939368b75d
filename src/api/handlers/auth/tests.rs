//! Handler tests over lazily-connected pools.
//!
//! The pools never reach a database, so any path that touches the store
//! fails with 500. A 4xx response therefore proves the request was rejected
//! before any store access happened.

use anyhow::{Context, Result};
use axum::body::to_bytes;
use axum::extract::Extension;
use axum::http::{
    header::{COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue, StatusCode,
};
use axum::response::{IntoResponse, Response};
use axum::Json;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::api::email::LogEmailSender;

use super::csrf;
use super::forgot::password_email;
use super::login::{auth_login, logout};
use super::rate_limit::{RateBudget, RateLimiter};
use super::register::{register_form, site_register};
use super::reset::password_change;
use super::session::{MemorySessionStore, SessionStore};
use super::state::{AuthConfig, AuthState};
use super::types::{
    ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, RegisterRequest,
};

const SESSION_ID: &str = "test-session";

struct TestContext {
    state: Arc<AuthState>,
    sessions: Arc<MemorySessionStore>,
    pool: PgPool,
}

fn lazy_pool() -> Result<PgPool> {
    PgPoolOptions::new()
        .connect_lazy("postgres://postgres@localhost/postgres")
        .context("failed to build lazy pool")
}

fn context() -> Result<TestContext> {
    context_with_config(AuthConfig::new("https://pasejo.dev")?)
}

fn context_with_config(config: AuthConfig) -> Result<TestContext> {
    let sessions = Arc::new(MemorySessionStore::new(Duration::from_secs(60)));
    let state = Arc::new(AuthState::new(
        config,
        sessions.clone(),
        RateLimiter::in_process(),
        Arc::new(LogEmailSender),
    ));
    Ok(TestContext {
        state,
        sessions,
        pool: lazy_pool()?,
    })
}

async fn seeded_csrf(ctx: &TestContext) -> Result<String> {
    csrf::issue(ctx.sessions.as_ref(), SESSION_ID).await
}

fn session_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        COOKIE,
        HeaderValue::from_static("pasejo_session=test-session"),
    );
    headers
}

async fn body_json(response: Response) -> Result<serde_json::Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    serde_json::from_slice(&bytes).context("response body is not JSON")
}

#[tokio::test]
async fn register_form_issues_token_and_session_cookie() -> Result<()> {
    let ctx = context()?;
    let response = register_form(HeaderMap::new(), Extension(ctx.state.clone()))
        .await
        .into_response();

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(cookie.starts_with("pasejo_session="));

    let body = body_json(response).await?;
    let csrf = body.get("csrf").and_then(serde_json::Value::as_str);
    assert!(csrf.is_some_and(|token| !token.is_empty()));
    Ok(())
}

#[tokio::test]
async fn register_form_reuses_existing_session() -> Result<()> {
    let ctx = context()?;
    let response = register_form(session_headers(), Extension(ctx.state.clone()))
        .await
        .into_response();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(SET_COOKIE).is_none());
    Ok(())
}

#[tokio::test]
async fn site_register_missing_payload() -> Result<()> {
    let ctx = context()?;
    let response = site_register(
        session_headers(),
        Extension(ctx.pool.clone()),
        Extension(ctx.state.clone()),
        None,
    )
    .await
    .into_response();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await?;
    assert_eq!(
        body.get("error").and_then(serde_json::Value::as_str),
        Some("Missing payload")
    );
    // Error envelopes always carry a fresh token for retry.
    assert!(body
        .get("csrf")
        .and_then(serde_json::Value::as_str)
        .is_some_and(|token| !token.is_empty()));
    Ok(())
}

#[tokio::test]
async fn site_register_rejected_before_store_without_csrf() -> Result<()> {
    let ctx = context()?;
    let request = RegisterRequest {
        name: Some("Alice".to_string()),
        email: Some("alice@example.com".to_string()),
        password: Some("Str0ng-pass!".to_string()),
        csrf_token: None,
    };
    let response = site_register(
        session_headers(),
        Extension(ctx.pool.clone()),
        Extension(ctx.state.clone()),
        Some(Json(request)),
    )
    .await
    .into_response();

    // 400, not 500: the unreachable pool was never touched.
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await?;
    assert_eq!(
        body.get("error").and_then(serde_json::Value::as_str),
        Some("Invalid CSRF token")
    );
    Ok(())
}

#[tokio::test]
async fn site_register_requires_name() -> Result<()> {
    let ctx = context()?;
    let csrf = seeded_csrf(&ctx).await?;
    let request = RegisterRequest {
        name: None,
        email: Some("alice@example.com".to_string()),
        password: Some("Str0ng-pass!".to_string()),
        csrf_token: Some(csrf),
    };
    let response = site_register(
        session_headers(),
        Extension(ctx.pool.clone()),
        Extension(ctx.state.clone()),
        Some(Json(request)),
    )
    .await
    .into_response();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await?;
    assert_eq!(
        body.get("error").and_then(serde_json::Value::as_str),
        Some("Please enter your name")
    );
    Ok(())
}

#[tokio::test]
async fn site_register_rejects_invalid_email() -> Result<()> {
    let ctx = context()?;
    let csrf = seeded_csrf(&ctx).await?;
    let request = RegisterRequest {
        name: Some("Alice".to_string()),
        email: Some("not-an-email".to_string()),
        password: Some("Str0ng-pass!".to_string()),
        csrf_token: Some(csrf),
    };
    let response = site_register(
        session_headers(),
        Extension(ctx.pool.clone()),
        Extension(ctx.state.clone()),
        Some(Json(request)),
    )
    .await
    .into_response();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await?;
    assert_eq!(
        body.get("error").and_then(serde_json::Value::as_str),
        Some("Please enter a valid email address")
    );
    Ok(())
}

#[tokio::test]
async fn site_register_enforces_password_policy() -> Result<()> {
    let ctx = context()?;
    let csrf = seeded_csrf(&ctx).await?;
    let request = RegisterRequest {
        name: Some("Alice".to_string()),
        email: Some("alice@example.com".to_string()),
        password: Some("weak".to_string()),
        csrf_token: Some(csrf),
    };
    let response = site_register(
        session_headers(),
        Extension(ctx.pool.clone()),
        Extension(ctx.state.clone()),
        Some(Json(request)),
    )
    .await
    .into_response();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await?;
    let error = body
        .get("error")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    assert!(error.starts_with("Password must contain"));
    Ok(())
}

#[tokio::test]
async fn auth_login_missing_payload() -> Result<()> {
    let ctx = context()?;
    let response = auth_login(
        session_headers(),
        Extension(ctx.pool.clone()),
        Extension(ctx.state.clone()),
        None,
    )
    .await
    .into_response();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn auth_login_rejects_forged_csrf() -> Result<()> {
    let ctx = context()?;
    let _valid = seeded_csrf(&ctx).await?;
    let request = LoginRequest {
        login: Some("alice@example.com".to_string()),
        password: Some("Str0ng-pass!".to_string()),
        csrf_token: Some("forged".to_string()),
    };
    let response = auth_login(
        session_headers(),
        Extension(ctx.pool.clone()),
        Extension(ctx.state.clone()),
        Some(Json(request)),
    )
    .await
    .into_response();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn auth_login_rate_limited_after_budget() -> Result<()> {
    let config = AuthConfig::new("https://pasejo.dev")?.with_login_budget(RateBudget {
        limit: 1,
        window_seconds: 300,
    });
    let ctx = context_with_config(config)?;

    let request = || LoginRequest {
        login: Some("alice@example.com".to_string()),
        password: Some("Str0ng-pass!".to_string()),
        csrf_token: None,
    };

    // First request consumes the budget and fails on CSRF instead.
    let first = auth_login(
        session_headers(),
        Extension(ctx.pool.clone()),
        Extension(ctx.state.clone()),
        Some(Json(request())),
    )
    .await
    .into_response();
    assert_eq!(first.status(), StatusCode::BAD_REQUEST);

    let second = auth_login(
        session_headers(),
        Extension(ctx.pool.clone()),
        Extension(ctx.state.clone()),
        Some(Json(request())),
    )
    .await
    .into_response();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    Ok(())
}

#[tokio::test]
async fn password_email_rejected_before_store_without_csrf() -> Result<()> {
    let ctx = context()?;
    let request = ForgotPasswordRequest {
        email: Some("alice@example.com".to_string()),
        csrf_token: None,
    };
    let response = password_email(
        session_headers(),
        Extension(ctx.pool.clone()),
        Extension(ctx.state.clone()),
        Some(Json(request)),
    )
    .await
    .into_response();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn password_email_rejects_invalid_email() -> Result<()> {
    let ctx = context()?;
    let csrf = seeded_csrf(&ctx).await?;
    let request = ForgotPasswordRequest {
        email: Some("not-an-email".to_string()),
        csrf_token: Some(csrf),
    };
    let response = password_email(
        session_headers(),
        Extension(ctx.pool.clone()),
        Extension(ctx.state.clone()),
        Some(Json(request)),
    )
    .await
    .into_response();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await?;
    assert_eq!(
        body.get("error").and_then(serde_json::Value::as_str),
        Some("Please enter a valid email address")
    );
    Ok(())
}

#[tokio::test]
async fn password_change_requires_token() -> Result<()> {
    let ctx = context()?;
    let request = ChangePasswordRequest {
        token: None,
        email: Some("alice@example.com".to_string()),
        password: Some("Str0ng-pass!".to_string()),
        csrf_token: None,
    };
    let response = password_change(
        session_headers(),
        Extension(ctx.pool.clone()),
        Extension(ctx.state.clone()),
        Some(Json(request)),
    )
    .await
    .into_response();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await?;
    assert_eq!(
        body.get("error").and_then(serde_json::Value::as_str),
        Some("Missing reset token")
    );
    Ok(())
}

#[tokio::test]
async fn password_change_rejected_before_store_without_csrf() -> Result<()> {
    let ctx = context()?;
    let request = ChangePasswordRequest {
        token: Some("some-reset-token".to_string()),
        email: Some("alice@example.com".to_string()),
        password: Some("Str0ng-pass!".to_string()),
        csrf_token: Some("forged".to_string()),
    };
    let response = password_change(
        session_headers(),
        Extension(ctx.pool.clone()),
        Extension(ctx.state.clone()),
        Some(Json(request)),
    )
    .await
    .into_response();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn logout_clears_cookie_and_redirects() -> Result<()> {
    let ctx = context()?;
    ctx.sessions.set(SESSION_ID, "user_id", "42").await;

    let response = logout(session_headers(), Extension(ctx.state.clone()))
        .await
        .into_response();

    assert!(response.status().is_redirection());
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    assert!(cookie.contains("Max-Age=0"));
    assert_eq!(ctx.sessions.get(SESSION_ID, "user_id").await, None);
    Ok(())
}
