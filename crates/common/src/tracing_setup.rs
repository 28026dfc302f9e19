use crate::config::LoggingConfig;
use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Install the global subscriber, writing to stderr. `RUST_LOG` wins over
/// the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))?;
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.with_target)
        .with_thread_ids(false)
        .with_line_number(false);

    Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    info!("Tracing initialized with level: {}", config.level);

    Ok(())
}

/// Same as [`init_tracing`] with a plain level string.
pub fn init_tracing_with_level(level: &str) -> Result<()> {
    init_tracing(&LoggingConfig {
        level: level.to_string(),
        ..Default::default()
    })
}
