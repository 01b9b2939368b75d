//! Password-reset email dispatch.
//!
//! The forgot-password flow only persists a reset-token digest after the
//! sender reports success, so an `Err` from a sender must mean "nothing was
//! delivered". The default sender for local dev is [`LogEmailSender`], which
//! logs the payload and succeeds; [`HttpEmailSender`] posts the message to an
//! HTTP mail relay.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::time::Duration;
use tracing::info;
use url::Url;

#[derive(Clone, Debug)]
pub struct PasswordResetEmail {
    pub to_email: String,
    pub reset_url: String,
}

/// Email delivery abstraction consumed by the forgot-password flow.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver the reset message, or return an error if nothing went out.
    async fn send_password_reset(&self, message: &PasswordResetEmail) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send_password_reset(&self, message: &PasswordResetEmail) -> Result<()> {
        info!(
            to_email = %message.to_email,
            reset_url = %message.reset_url,
            "password reset email send stub"
        );
        Ok(())
    }
}

/// Sender backed by an HTTP mail relay.
pub struct HttpEmailSender {
    client: Client,
    endpoint: Url,
    token: Option<SecretString>,
}

impl HttpEmailSender {
    /// # Errors
    /// Returns an error if the endpoint is not a valid URL or the HTTP
    /// client cannot be built.
    pub fn new(endpoint: &str, token: Option<SecretString>) -> Result<Self> {
        let endpoint =
            Url::parse(endpoint).with_context(|| format!("Invalid mailer endpoint: {endpoint}"))?;
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(Duration::from_secs(5))
            .build()
            .context("failed to create mailer client")?;
        Ok(Self {
            client,
            endpoint,
            token,
        })
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send_password_reset(&self, message: &PasswordResetEmail) -> Result<()> {
        let mut request = self.client.post(self.endpoint.clone()).json(&json!({
            "to": message.to_email,
            "template": "password_reset",
            "reset_url": message.reset_url,
        }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.context("failed to reach mail relay")?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(anyhow!("mail relay returned {}", response.status()))
        }
    }
}
