//! Rate limiting and throttling arguments.

use clap::{Arg, ArgMatches, Command};

pub const ARG_GLOBAL_WINDOW: &str = "rate-limit-global-window-seconds";
pub const ARG_GLOBAL_MAX: &str = "rate-limit-global-max";
pub const ARG_AUTH_WINDOW: &str = "rate-limit-auth-window-seconds";
pub const ARG_AUTH_MAX: &str = "rate-limit-auth-max";
pub const ARG_THROTTLE_AFTER: &str = "throttle-after";
pub const ARG_THROTTLE_STEP_MS: &str = "throttle-delay-step-ms";
pub const ARG_THROTTLE_CAP_MS: &str = "throttle-delay-cap-ms";

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub global_window_seconds: u64,
    pub global_max: u32,
    pub auth_window_seconds: u64,
    pub auth_max: u32,
    pub throttle_after: u32,
    pub throttle_step_ms: u64,
    pub throttle_cap_ms: u64,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            global_window_seconds: matches
                .get_one::<u64>(ARG_GLOBAL_WINDOW)
                .copied()
                .unwrap_or(15 * 60),
            global_max: matches.get_one::<u32>(ARG_GLOBAL_MAX).copied().unwrap_or(100),
            auth_window_seconds: matches
                .get_one::<u64>(ARG_AUTH_WINDOW)
                .copied()
                .unwrap_or(10 * 60),
            auth_max: matches.get_one::<u32>(ARG_AUTH_MAX).copied().unwrap_or(5),
            throttle_after: matches
                .get_one::<u32>(ARG_THROTTLE_AFTER)
                .copied()
                .unwrap_or(50),
            throttle_step_ms: matches
                .get_one::<u64>(ARG_THROTTLE_STEP_MS)
                .copied()
                .unwrap_or(100),
            throttle_cap_ms: matches
                .get_one::<u64>(ARG_THROTTLE_CAP_MS)
                .copied()
                .unwrap_or(2000),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_GLOBAL_WINDOW)
                .long(ARG_GLOBAL_WINDOW)
                .help("Global rate limit window in seconds")
                .env("CLAVIS_RATE_LIMIT_GLOBAL_WINDOW_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_GLOBAL_MAX)
                .long(ARG_GLOBAL_MAX)
                .help("Requests allowed per client within the global window")
                .env("CLAVIS_RATE_LIMIT_GLOBAL_MAX")
                .default_value("100")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_AUTH_WINDOW)
                .long(ARG_AUTH_WINDOW)
                .help("Auth route (login/register) rate limit window in seconds")
                .env("CLAVIS_RATE_LIMIT_AUTH_WINDOW_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_AUTH_MAX)
                .long(ARG_AUTH_MAX)
                .help("Login/register attempts allowed per client within the auth window")
                .env("CLAVIS_RATE_LIMIT_AUTH_MAX")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_THROTTLE_AFTER)
                .long(ARG_THROTTLE_AFTER)
                .help("Requests per window before progressive slowdown starts")
                .env("CLAVIS_THROTTLE_AFTER")
                .default_value("50")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_THROTTLE_STEP_MS)
                .long(ARG_THROTTLE_STEP_MS)
                .help("Added delay per excess request in milliseconds")
                .env("CLAVIS_THROTTLE_DELAY_STEP_MS")
                .default_value("100")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_THROTTLE_CAP_MS)
                .long(ARG_THROTTLE_CAP_MS)
                .help("Maximum progressive delay in milliseconds")
                .env("CLAVIS_THROTTLE_DELAY_CAP_MS")
                .default_value("2000")
                .value_parser(clap::value_parser!(u64)),
        )
}
