//! Session bag and cookie plumbing.
//!
//! The session is an opaque key-value bag keyed by a server-issued
//! identifier. The identifier travels in an `HttpOnly` cookie; the bag
//! itself lives behind the [`SessionStore`] trait so flows never depend on
//! where session state is kept.

use async_trait::async_trait;
use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::state::AuthConfig;
use super::utils::generate_session_id;

pub(super) const SESSION_COOKIE_NAME: &str = "pasejo_session";

pub(super) const USER_ID_KEY: &str = "user_id";
pub(super) const USER_NAME_KEY: &str = "user_name";
pub(super) const USER_EMAIL_KEY: &str = "user_email";

/// Opaque per-session key-value bag.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str, key: &str) -> Option<String>;
    async fn set(&self, session_id: &str, key: &str, value: &str);
    async fn clear(&self, session_id: &str);
}

struct SessionEntry {
    values: HashMap<String, String>,
    created_at: Instant,
}

/// In-process session bag with TTL-based pruning on write.
pub struct MemorySessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str, key: &str) -> Option<String> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(session_id)
            .filter(|entry| entry.created_at.elapsed() < self.ttl)
            .and_then(|entry| entry.values.get(key).cloned())
    }

    async fn set(&self, session_id: &str, key: &str, value: &str) {
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|_, entry| entry.created_at.elapsed() < self.ttl);
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                values: HashMap::new(),
                created_at: Instant::now(),
            })
            .values
            .insert(key.to_string(), value.to_string());
    }

    async fn clear(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(session_id);
    }
}

/// Session identity for one request: the cookie's identifier, or a freshly
/// minted one when the request carried none.
pub(super) struct SessionHandle {
    pub(super) id: String,
    pub(super) is_new: bool,
}

pub(super) fn client_session(headers: &HeaderMap) -> anyhow::Result<SessionHandle> {
    if let Some(id) = extract_session_id(headers) {
        return Ok(SessionHandle { id, is_new: false });
    }
    Ok(SessionHandle {
        id: generate_session_id()?,
        is_new: true,
    })
}

fn extract_session_id(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME && !val.is_empty() {
            return Some(val.to_string());
        }
    }
    None
}

/// Build a `HttpOnly` cookie carrying the session identifier.
pub(super) fn session_cookie(
    config: &AuthConfig,
    session_id: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.session_ttl_seconds();
    // Only mark cookies secure when the service is served over HTTPS.
    let secure = config.session_cookie_secure();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={session_id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let secure = config.session_cookie_secure();
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn config() -> AuthConfig {
        AuthConfig::new("https://pasejo.dev").expect("valid base url")
    }

    #[tokio::test]
    async fn memory_store_set_get_clear() {
        let store = MemorySessionStore::new(Duration::from_secs(60));
        store.set("sid", "user_id", "42").await;
        assert_eq!(store.get("sid", "user_id").await.as_deref(), Some("42"));
        assert_eq!(store.get("sid", "missing").await, None);
        assert_eq!(store.get("other", "user_id").await, None);

        store.clear("sid").await;
        assert_eq!(store.get("sid", "user_id").await, None);
    }

    #[tokio::test]
    async fn memory_store_expires_entries() {
        let store = MemorySessionStore::new(Duration::from_secs(0));
        store.set("sid", "user_id", "42").await;
        assert_eq!(store.get("sid", "user_id").await, None);
    }

    #[test]
    fn client_session_reuses_cookie_id() -> Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("other=1; pasejo_session=abc123"),
        );
        let session = client_session(&headers)?;
        assert_eq!(session.id, "abc123");
        assert!(!session.is_new);
        Ok(())
    }

    #[test]
    fn client_session_mints_id_without_cookie() -> Result<()> {
        let session = client_session(&HeaderMap::new())?;
        assert!(session.is_new);
        assert!(!session.id.is_empty());
        Ok(())
    }

    #[test]
    fn session_cookie_is_http_only_and_secure_on_https() -> Result<()> {
        let cookie = session_cookie(&config(), "abc123")?;
        let cookie = cookie.to_str()?;
        assert!(cookie.starts_with("pasejo_session=abc123"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Secure"));
        Ok(())
    }

    #[test]
    fn session_cookie_not_secure_on_http() -> Result<()> {
        let config = AuthConfig::new("http://localhost:8080")?;
        let cookie = session_cookie(&config, "abc123")?;
        assert!(!cookie.to_str()?.contains("Secure"));
        Ok(())
    }

    #[test]
    fn clear_session_cookie_zeroes_max_age() -> Result<()> {
        let cookie = clear_session_cookie(&config())?;
        assert!(cookie.to_str()?.contains("Max-Age=0"));
        Ok(())
    }
}
