use crate::api::{
    self,
    email::{HttpMailSender, LogMailSender, MailSender},
    handlers::auth::{AuthConfig, AuthState, RateLimitSettings, WindowedLimiter, TokenKeys},
};
use anyhow::Result;
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub reset_token_ttl_seconds: i64,
    pub frontend_base_url: String,
    pub mail_endpoint: Option<String>,
    pub mail_token: Option<String>,
    pub mail_from: String,
    pub mail_timeout_seconds: u64,
    pub global_window_seconds: u64,
    pub global_max: u32,
    pub auth_window_seconds: u64,
    pub auth_max: u32,
    pub throttle_after: u32,
    pub throttle_step_ms: u64,
    pub throttle_cap_ms: u64,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if the mail sender cannot be built or the server fails
/// to start.
pub async fn execute(args: Args) -> Result<()> {
    let config = AuthConfig::new(args.frontend_base_url)
        .with_access_token_ttl_seconds(args.access_token_ttl_seconds)
        .with_refresh_token_ttl_seconds(args.refresh_token_ttl_seconds)
        .with_reset_token_ttl_seconds(args.reset_token_ttl_seconds)
        .with_mail_timeout(Duration::from_secs(args.mail_timeout_seconds));

    let keys = TokenKeys::from_secrets(
        &SecretString::from(args.access_token_secret),
        &SecretString::from(args.refresh_token_secret),
    );

    let limiter = Arc::new(WindowedLimiter::new(RateLimitSettings {
        global_window: Duration::from_secs(args.global_window_seconds),
        global_max: args.global_max,
        auth_window: Duration::from_secs(args.auth_window_seconds),
        auth_max: args.auth_max,
        throttle_after: args.throttle_after,
        throttle_step: Duration::from_millis(args.throttle_step_ms),
        throttle_cap: Duration::from_millis(args.throttle_cap_ms),
    }));

    let mailer: Arc<dyn MailSender> = match args.mail_endpoint {
        Some(endpoint) => {
            let token = args.mail_token.map(SecretString::from);
            Arc::new(HttpMailSender::new(
                endpoint,
                token,
                args.mail_from,
                Duration::from_secs(args.mail_timeout_seconds),
            )?)
        }
        None => {
            info!("No mail endpoint configured, outbound mail will be logged");
            Arc::new(LogMailSender)
        }
    };

    let auth_state = Arc::new(AuthState::new(config, keys, limiter, mailer));

    api::new(args.port, args.dsn, auth_state).await
}
