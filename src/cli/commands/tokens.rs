//! Token signing and lifetime arguments.

use anyhow::{Context, Result, anyhow};
use clap::{Arg, ArgMatches, Command};

pub const ARG_ACCESS_TOKEN_SECRET: &str = "access-token-secret";
pub const ARG_REFRESH_TOKEN_SECRET: &str = "refresh-token-secret";
pub const ARG_ACCESS_TOKEN_TTL: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TOKEN_TTL: &str = "refresh-token-ttl-seconds";
pub const ARG_RESET_TOKEN_TTL: &str = "reset-token-ttl-seconds";

#[derive(Debug)]
pub struct Options {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub reset_ttl_seconds: i64,
}

impl Options {
    /// Extract token options from parsed matches.
    ///
    /// # Errors
    /// Returns an error if a secret is missing, empty, or the two secrets are
    /// identical (compromise of one token class must not forge the other).
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let access_secret = matches
            .get_one::<String>(ARG_ACCESS_TOKEN_SECRET)
            .cloned()
            .context("missing required argument: --access-token-secret")?;
        let refresh_secret = matches
            .get_one::<String>(ARG_REFRESH_TOKEN_SECRET)
            .cloned()
            .context("missing required argument: --refresh-token-secret")?;

        if access_secret.trim().is_empty() || refresh_secret.trim().is_empty() {
            return Err(anyhow!("token secrets must not be empty"));
        }
        if access_secret == refresh_secret {
            return Err(anyhow!(
                "access and refresh token secrets must be distinct"
            ));
        }

        Ok(Self {
            access_secret,
            refresh_secret,
            access_ttl_seconds: matches
                .get_one::<i64>(ARG_ACCESS_TOKEN_TTL)
                .copied()
                .unwrap_or(15 * 60),
            refresh_ttl_seconds: matches
                .get_one::<i64>(ARG_REFRESH_TOKEN_TTL)
                .copied()
                .unwrap_or(7 * 24 * 60 * 60),
            reset_ttl_seconds: matches
                .get_one::<i64>(ARG_RESET_TOKEN_TTL)
                .copied()
                .unwrap_or(10 * 60),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_SECRET)
                .long(ARG_ACCESS_TOKEN_SECRET)
                .help("Secret used to sign access tokens")
                .env("CLAVIS_ACCESS_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_SECRET)
                .long(ARG_REFRESH_TOKEN_SECRET)
                .help("Secret used to sign refresh tokens (must differ from the access secret)")
                .env("CLAVIS_REFRESH_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL)
                .long(ARG_ACCESS_TOKEN_TTL)
                .help("Access token lifetime in seconds")
                .env("CLAVIS_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL)
                .long(ARG_REFRESH_TOKEN_TTL)
                .help("Refresh token lifetime in seconds")
                .env("CLAVIS_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_RESET_TOKEN_TTL)
                .long(ARG_RESET_TOKEN_TTL)
                .help("Password reset token lifetime in seconds")
                .env("CLAVIS_RESET_TOKEN_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64)),
        )
}
