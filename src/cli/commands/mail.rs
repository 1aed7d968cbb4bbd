//! Outbound mail arguments.

use clap::{Arg, ArgMatches, Command};

pub const ARG_MAIL_ENDPOINT: &str = "mail-endpoint";
pub const ARG_MAIL_TOKEN: &str = "mail-token";
pub const ARG_MAIL_FROM: &str = "mail-from";
pub const ARG_MAIL_TIMEOUT: &str = "mail-timeout-seconds";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";

#[derive(Debug)]
pub struct Options {
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub from: String,
    pub timeout_seconds: u64,
    pub frontend_base_url: String,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            endpoint: matches.get_one::<String>(ARG_MAIL_ENDPOINT).cloned(),
            token: matches.get_one::<String>(ARG_MAIL_TOKEN).cloned(),
            from: matches
                .get_one::<String>(ARG_MAIL_FROM)
                .cloned()
                .unwrap_or_else(|| "no-reply@clavis.dev".to_string()),
            timeout_seconds: matches
                .get_one::<u64>(ARG_MAIL_TIMEOUT)
                .copied()
                .unwrap_or(10),
            frontend_base_url: matches
                .get_one::<String>(ARG_FRONTEND_BASE_URL)
                .cloned()
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAIL_ENDPOINT)
                .long(ARG_MAIL_ENDPOINT)
                .help("Outbound mail HTTP API endpoint; when unset, mail is logged instead of sent")
                .env("CLAVIS_MAIL_ENDPOINT"),
        )
        .arg(
            Arg::new(ARG_MAIL_TOKEN)
                .long(ARG_MAIL_TOKEN)
                .help("Bearer token for the outbound mail endpoint")
                .env("CLAVIS_MAIL_TOKEN")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_MAIL_FROM)
                .long(ARG_MAIL_FROM)
                .help("From address for outbound mail")
                .env("CLAVIS_MAIL_FROM")
                .default_value("no-reply@clavis.dev"),
        )
        .arg(
            Arg::new(ARG_MAIL_TIMEOUT)
                .long(ARG_MAIL_TIMEOUT)
                .help("Bounded wait for mail delivery before treating it as failed, in seconds")
                .env("CLAVIS_MAIL_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Public frontend base URL, used for CORS and password reset links")
                .env("CLAVIS_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        )
}
