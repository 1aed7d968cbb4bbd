//! Shared auth configuration and runtime state.

use super::rate_limit::RateLimiter;
use super::tokens::TokenKeys;
use crate::api::email::MailSender;
use std::{sync::Arc, time::Duration};

/// Tunables for token lifetimes and outbound mail.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    frontend_base_url: String,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
    reset_token_ttl_seconds: i64,
    mail_timeout: Duration,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            access_token_ttl_seconds: 900,
            refresh_token_ttl_seconds: 604_800,
            reset_token_ttl_seconds: 600,
            mail_timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub const fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn with_refresh_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn with_mail_timeout(mut self, timeout: Duration) -> Self {
        self.mail_timeout = timeout;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub const fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl_seconds
    }

    #[must_use]
    pub const fn refresh_token_ttl_seconds(&self) -> i64 {
        self.refresh_token_ttl_seconds
    }

    #[must_use]
    pub const fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }

    #[must_use]
    pub const fn mail_timeout(&self) -> Duration {
        self.mail_timeout
    }

    /// Mark the refresh cookie Secure when the frontend is served over TLS.
    #[must_use]
    pub fn refresh_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

/// Shared state handed to every auth handler.
pub struct AuthState {
    config: AuthConfig,
    keys: TokenKeys,
    rate_limiter: Arc<dyn RateLimiter>,
    mailer: Arc<dyn MailSender>,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        keys: TokenKeys,
        rate_limiter: Arc<dyn RateLimiter>,
        mailer: Arc<dyn MailSender>,
    ) -> Self {
        Self {
            config,
            keys,
            rate_limiter,
            mailer,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub const fn keys(&self) -> &TokenKeys {
        &self.keys
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    #[must_use]
    pub fn mailer(&self) -> &dyn MailSender {
        self.mailer.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::email::LogMailSender;
    use crate::api::handlers::auth::rate_limit::NoopRateLimiter;
    use secrecy::SecretString;

    fn test_state() -> AuthState {
        let config = AuthConfig::new("http://localhost:3000".to_string());
        let keys = TokenKeys::from_secrets(
            &SecretString::from("access-secret"),
            &SecretString::from("refresh-secret"),
        );
        AuthState::new(config, keys, Arc::new(NoopRateLimiter), Arc::new(LogMailSender))
    }

    #[test]
    fn config_defaults() {
        let config = AuthConfig::new("http://localhost:3000".to_string());
        assert_eq!(config.access_token_ttl_seconds(), 900);
        assert_eq!(config.refresh_token_ttl_seconds(), 604_800);
        assert_eq!(config.reset_token_ttl_seconds(), 600);
        assert_eq!(config.mail_timeout(), Duration::from_secs(10));
        assert!(!config.refresh_cookie_secure());
    }

    #[test]
    fn config_builder_overrides() {
        let config = AuthConfig::new("https://shop.example.com".to_string())
            .with_access_token_ttl_seconds(60)
            .with_refresh_token_ttl_seconds(3600)
            .with_reset_token_ttl_seconds(120)
            .with_mail_timeout(Duration::from_secs(5));
        assert_eq!(config.access_token_ttl_seconds(), 60);
        assert_eq!(config.refresh_token_ttl_seconds(), 3600);
        assert_eq!(config.reset_token_ttl_seconds(), 120);
        assert_eq!(config.mail_timeout(), Duration::from_secs(5));
        assert!(config.refresh_cookie_secure());
    }

    #[test]
    fn state_exposes_config() {
        let state = test_state();
        assert_eq!(state.config().frontend_base_url(), "http://localhost:3000");
    }
}
