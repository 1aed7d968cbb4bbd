//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the
//! appropriate action, such as starting the API server with its full
//! configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{mail, rate_limit, tokens};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let token_opts = tokens::Options::parse(matches)?;
    let mail_opts = mail::Options::parse(matches);
    let rate_opts = rate_limit::Options::parse(matches);

    Ok(Action::Server(Box::new(Args {
        port,
        dsn,
        access_token_secret: token_opts.access_secret,
        refresh_token_secret: token_opts.refresh_secret,
        access_token_ttl_seconds: token_opts.access_ttl_seconds,
        refresh_token_ttl_seconds: token_opts.refresh_ttl_seconds,
        reset_token_ttl_seconds: token_opts.reset_ttl_seconds,
        frontend_base_url: mail_opts.frontend_base_url,
        mail_endpoint: mail_opts.endpoint,
        mail_token: mail_opts.token,
        mail_from: mail_opts.from,
        mail_timeout_seconds: mail_opts.timeout_seconds,
        global_window_seconds: rate_opts.global_window_seconds,
        global_max: rate_opts.global_max,
        auth_window_seconds: rate_opts.auth_window_seconds,
        auth_max: rate_opts.auth_max,
        throttle_after: rate_opts.throttle_after,
        throttle_step_ms: rate_opts.throttle_step_ms,
        throttle_cap_ms: rate_opts.throttle_cap_ms,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::actions::Action;

    #[test]
    fn identical_secrets_rejected() {
        temp_env::with_vars(
            [
                ("CLAVIS_DSN", Some("postgres://localhost/clavis")),
                ("CLAVIS_ACCESS_TOKEN_SECRET", Some("same")),
                ("CLAVIS_REFRESH_TOKEN_SECRET", Some("same")),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["clavis"]);
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(err.to_string().contains("distinct"));
                }
            },
        );
    }

    #[test]
    fn builds_server_action() {
        temp_env::with_vars(
            [
                ("CLAVIS_DSN", Some("postgres://localhost/clavis")),
                ("CLAVIS_ACCESS_TOKEN_SECRET", Some("access")),
                ("CLAVIS_REFRESH_TOKEN_SECRET", Some("refresh")),
                ("CLAVIS_PORT", Some("9100")),
                ("CLAVIS_THROTTLE_AFTER", Some("25")),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["clavis"]);
                let action = handler(&matches);
                assert!(action.is_ok());
                if let Ok(Action::Server(args)) = action {
                    assert_eq!(args.port, 9100);
                    assert_eq!(args.dsn, "postgres://localhost/clavis");
                    assert_eq!(args.access_token_ttl_seconds, 900);
                    assert_eq!(args.refresh_token_ttl_seconds, 604_800);
                    assert_eq!(args.throttle_after, 25);
                }
            },
        );
    }
}
