use crate::api;
use crate::api::email::{EmailSender, HttpEmailSender, LogEmailSender};
use crate::api::handlers::auth::{AuthConfig, RateLimiter, RedisCounterStore};
use crate::cli::actions::Action;
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::info;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    let Action::Server {
        port,
        dsn,
        base_url,
        redis_url,
        mailer_url,
        mailer_token,
    } = action;

    // Configuration is validated once here; the handlers only ever see the
    // immutable result.
    let auth_config = AuthConfig::new(&base_url)?;

    let rate_limiter = match redis_url {
        Some(url) => {
            let store = RedisCounterStore::new(&url)
                .with_context(|| format!("invalid redis URL: {url}"))?;
            RateLimiter::with_shared(Arc::new(store))
        }
        None => {
            info!("No shared counter store configured, rate limits are per-instance");
            RateLimiter::in_process()
        }
    };

    let mailer: Arc<dyn EmailSender> = match mailer_url {
        Some(url) => Arc::new(HttpEmailSender::new(
            &url,
            mailer_token.map(SecretString::from),
        )?),
        None => {
            info!("No mailer endpoint configured, password-reset email is logged only");
            Arc::new(LogEmailSender)
        }
    };

    api::new(port, dsn, auth_config, rate_limiter, mailer).await?;

    Ok(())
}
