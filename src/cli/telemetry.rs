use anyhow::Result;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};

/// Initialize the global tracing subscriber.
///
/// The default directive comes from the CLI verbosity; `RUST_LOG` still wins
/// for per-target overrides.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init(verbosity_level: Option<tracing::Level>) -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false);

    let default_level = verbosity_level.unwrap_or(tracing::Level::ERROR);

    // RUST_LOG=
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let subscriber = Registry::default().with(fmt_layer).with(env_filter);

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}
