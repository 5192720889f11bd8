use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;

use crate::config::CoreConfig;
use crate::errors::{CoreError, Result};

/// Installs the fmt subscriber for the CLI and the dry-run service.
///
/// `RUST_LOG` wins over `RIDESHEAR_LOG_LEVEL`. Production output has no
/// colours or module targets.
pub fn init_tracing(config: &CoreConfig) -> Result<()> {
    let filter = log_filter(config)?;
    let ansi = !config.is_production() && atty::is(atty::Stream::Stdout);

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(!config.is_production())
        .with_ansi(ansi)
        .try_init()
        .map_err(|err| CoreError::GeneralError(err.to_string()))?;

    Ok(())
}

fn log_filter(config: &CoreConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.log_level).map_err(|err| {
        CoreError::ConfigError(format!("invalid log level `{}`: {err}", config.log_level))
    })
}
