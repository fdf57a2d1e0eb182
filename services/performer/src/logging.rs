//! Tracing subscriber setup

use anyhow::{Context, Result};
use performer_config::LoggingSettings;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber; `RUST_LOG` overrides the configured level
pub fn init_tracing(settings: &LoggingSettings) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.level)
            .with_context(|| format!("Invalid log level '{}'", settings.level))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    if settings.json {
        registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(false))
            .try_init()
            .context("Failed to install JSON tracing subscriber")?;
    } else {
        registry
            .with(fmt::layer().with_target(true))
            .try_init()
            .context("Failed to install tracing subscriber")?;
    }
    Ok(())
}
