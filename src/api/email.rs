//! Outbound transactional mail.
//!
//! Delivery goes through an HTTP relay; deployments without one get a
//! sender that only logs, which keeps local development working.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct MailMessage {
    pub to_email: String,
    pub subject: String,
    pub body_html: String,
}

/// Delivery seam so handlers never depend on a concrete relay.
#[async_trait]
pub trait MailSender: Send + Sync {
    /// Deliver a single message.
    async fn send(&self, message: &MailMessage) -> Result<()>;
}

/// Sender that logs instead of delivering.
pub struct LogMailSender;

#[async_trait]
impl MailSender for LogMailSender {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        info!(
            to = %message.to_email,
            subject = %message.subject,
            "Mail delivery skipped, no relay configured"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Sender that POSTs messages to an HTTP mail relay.
pub struct HttpMailSender {
    client: reqwest::Client,
    endpoint: String,
    token: Option<SecretString>,
    from: String,
}

impl HttpMailSender {
    /// Build a sender for the given relay endpoint.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        endpoint: String,
        token: Option<SecretString>,
        from: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("failed to build mail client")?;
        Ok(Self {
            client,
            endpoint,
            token,
            from,
        })
    }
}

#[async_trait]
impl MailSender for HttpMailSender {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        let payload = RelayPayload {
            from: &self.from,
            to: &message.to_email,
            subject: &message.subject,
            html: &message.body_html,
        };
        let mut request = self.client.post(&self.endpoint).json(&payload);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_sender_always_succeeds() {
        let message = MailMessage {
            to_email: "alice@example.com".to_string(),
            subject: "Hello".to_string(),
            body_html: "<p>Hi</p>".to_string(),
        };
        assert!(LogMailSender.send(&message).await.is_ok());
    }

    #[test]
    fn http_sender_builds() {
        let sender = HttpMailSender::new(
            "https://mail.example.com/send".to_string(),
            Some(SecretString::from("relay-token")),
            "no-reply@clavis.dev".to_string(),
            Duration::from_secs(10),
        );
        assert!(sender.is_ok());
    }

    #[tokio::test]
    async fn http_sender_fails_against_unreachable_relay() {
        let sender = HttpMailSender::new(
            "http://localhost:1/send".to_string(),
            None,
            "no-reply@clavis.dev".to_string(),
            Duration::from_millis(200),
        )
        .unwrap();
        let message = MailMessage {
            to_email: "alice@example.com".to_string(),
            subject: "Hello".to_string(),
            body_html: "<p>Hi</p>".to_string(),
        };
        assert!(sender.send(&message).await.is_err());
    }
}
