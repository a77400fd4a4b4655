//! Tracing subscriber setup

use crate::args::Cli;
use postcache_core::config::LoggingConfig;
use postcache_core::config::logging_config::LogFormat;
use tracing_subscriber::EnvFilter;

/// Logging settings for this invocation
pub fn logging_config(cli: &Cli) -> LoggingConfig {
    let base = if cli.verbose {
        LoggingConfig::verbose()
    } else {
        LoggingConfig::default()
    };
    LoggingConfig {
        format: cli.log_format,
        ..base
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins unless `--verbose` was passed.
pub fn init(cli: &Cli) {
    let config = logging_config(cli);
    let filter = if cli.verbose {
        EnvFilter::new(config.filter_directive())
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.filter_directive()))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.format {
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}
