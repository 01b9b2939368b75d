//! Auth configuration and shared per-process state.

use anyhow::{Context, Result};
use std::sync::Arc;
use url::Url;

use crate::api::email::EmailSender;

use super::policy::PasswordPolicy;
use super::rate_limit::{RateBudget, RateLimiter};
use super::session::SessionStore;

const DEFAULT_SESSION_TTL_SECONDS: u64 = 12 * 60 * 60;
const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_LOGIN_REDIRECT: &str = "/main";

const DEFAULT_LOGIN_BUDGET: RateBudget = RateBudget {
    limit: 5,
    window_seconds: 300,
};
const DEFAULT_PASSWORD_EMAIL_BUDGET: RateBudget = RateBudget {
    limit: 5,
    window_seconds: 900,
};
const DEFAULT_PASSWORD_CHANGE_BUDGET: RateBudget = RateBudget {
    limit: 5,
    window_seconds: 900,
};

/// Immutable configuration, assembled once at startup and passed by
/// reference from then on.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    base_url: String,
    session_ttl_seconds: u64,
    reset_token_ttl_seconds: i64,
    login_budget: RateBudget,
    password_email_budget: RateBudget,
    password_change_budget: RateBudget,
    password_policy: PasswordPolicy,
    login_redirect: String,
}

impl AuthConfig {
    /// Validates the base URL up front so the handlers never see an invalid
    /// configuration.
    ///
    /// # Errors
    /// Returns an error if `base_url` is not an absolute URL with a host.
    pub fn new(base_url: &str) -> Result<Self> {
        let parsed =
            Url::parse(base_url).with_context(|| format!("Invalid base URL: {base_url}"))?;
        parsed
            .host_str()
            .with_context(|| format!("Base URL must include a host: {base_url}"))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
            login_budget: DEFAULT_LOGIN_BUDGET,
            password_email_budget: DEFAULT_PASSWORD_EMAIL_BUDGET,
            password_change_budget: DEFAULT_PASSWORD_CHANGE_BUDGET,
            password_policy: PasswordPolicy::new(),
            login_redirect: DEFAULT_LOGIN_REDIRECT.to_string(),
        })
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_login_budget(mut self, budget: RateBudget) -> Self {
        self.login_budget = budget;
        self
    }

    #[must_use]
    pub fn with_password_email_budget(mut self, budget: RateBudget) -> Self {
        self.password_email_budget = budget;
        self
    }

    #[must_use]
    pub fn with_password_change_budget(mut self, budget: RateBudget) -> Self {
        self.password_change_budget = budget;
        self
    }

    #[must_use]
    pub fn with_password_policy(mut self, policy: PasswordPolicy) -> Self {
        self.password_policy = policy;
        self
    }

    #[must_use]
    pub fn with_login_redirect(mut self, redirect: String) -> Self {
        self.login_redirect = redirect;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> u64 {
        self.session_ttl_seconds
    }

    pub(super) fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }

    pub(super) fn login_budget(&self) -> RateBudget {
        self.login_budget
    }

    pub(super) fn password_email_budget(&self) -> RateBudget {
        self.password_email_budget
    }

    pub(super) fn password_change_budget(&self) -> RateBudget {
        self.password_change_budget
    }

    pub(super) fn password_policy(&self) -> &PasswordPolicy {
        &self.password_policy
    }

    pub(super) fn login_redirect(&self) -> &str {
        &self.login_redirect
    }

    pub(super) fn session_cookie_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }

    /// The link embedded in password-reset email.
    pub(super) fn reset_url(&self, token: &str) -> String {
        format!("{}/password/reset/{token}", self.base_url)
    }
}

/// Shared state handed to every auth handler.
pub struct AuthState {
    config: AuthConfig,
    sessions: Arc<dyn SessionStore>,
    rate_limiter: RateLimiter,
    mailer: Arc<dyn EmailSender>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        sessions: Arc<dyn SessionStore>,
        rate_limiter: RateLimiter,
        mailer: Arc<dyn EmailSender>,
    ) -> Self {
        Self {
            config,
            sessions,
            rate_limiter,
            mailer,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(super) fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    pub(super) fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub(super) fn mailer(&self) -> &dyn EmailSender {
        self.mailer.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::email::LogEmailSender;
    use crate::api::handlers::auth::session::MemorySessionStore;
    use anyhow::Result;
    use std::time::Duration;

    #[test]
    fn auth_config_defaults_and_overrides() -> Result<()> {
        let config = AuthConfig::new("https://pasejo.dev/")?;

        assert_eq!(config.base_url(), "https://pasejo.dev");
        assert_eq!(config.session_ttl_seconds(), DEFAULT_SESSION_TTL_SECONDS);
        assert_eq!(
            config.reset_token_ttl_seconds(),
            DEFAULT_RESET_TOKEN_TTL_SECONDS
        );
        assert_eq!(config.login_budget(), DEFAULT_LOGIN_BUDGET);
        assert_eq!(config.login_redirect(), "/main");
        assert!(config.session_cookie_secure());

        let config = config
            .with_session_ttl_seconds(60)
            .with_reset_token_ttl_seconds(120)
            .with_login_budget(RateBudget {
                limit: 1,
                window_seconds: 10,
            })
            .with_login_redirect("/home".to_string());

        assert_eq!(config.session_ttl_seconds(), 60);
        assert_eq!(config.reset_token_ttl_seconds(), 120);
        assert_eq!(
            config.login_budget(),
            RateBudget {
                limit: 1,
                window_seconds: 10
            }
        );
        assert_eq!(config.login_redirect(), "/home");
        Ok(())
    }

    #[test]
    fn auth_config_rejects_invalid_base_url() {
        assert!(AuthConfig::new("not a url").is_err());
        assert!(AuthConfig::new("file:///tmp").is_err());
    }

    #[test]
    fn reset_url_joins_token() -> Result<()> {
        let config = AuthConfig::new("https://pasejo.dev")?;
        assert_eq!(
            config.reset_url("abc123"),
            "https://pasejo.dev/password/reset/abc123"
        );
        Ok(())
    }

    #[test]
    fn auth_state_exposes_parts() -> Result<()> {
        let config = AuthConfig::new("http://localhost:8080")?;
        let sessions = Arc::new(MemorySessionStore::new(Duration::from_secs(60)));
        let state = AuthState::new(
            config,
            sessions,
            RateLimiter::in_process(),
            Arc::new(LogEmailSender),
        );
        assert_eq!(state.config().base_url(), "http://localhost:8080");
        assert!(!state.config().session_cookie_secure());
        Ok(())
    }
}
