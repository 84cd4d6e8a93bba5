use crate::config::{LoggingConfig, LoggingMode};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. The `logging.format`
/// directive is the baseline filter; `RUST_LOG` overrides it.
pub fn setup(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) => EnvFilter::try_new(directives)?,
        Err(_) => EnvFilter::try_new(&config.format)?,
    };

    match config.mode {
        LoggingMode::Friendly => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
        LoggingMode::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_current_span(false)
                .init();
        }
    }

    if !config.fields.is_empty() {
        tracing::info!(fields = ?config.fields, "Logging configured");
    }

    Ok(())
}
