//! Tracing subscriber setup

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "bookgen=info";

/// Install the global subscriber.
///
/// `BOOKGEN_LOG_FORMAT` overrides the configured format; `RUST_LOG` overrides
/// the default filter.
pub fn init(configured_format: &str) -> Result<()> {
    let format = std::env::var("BOOKGEN_LOG_FORMAT").unwrap_or_else(|_| configured_format.to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("Failed to create env filter")?;

    match format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init()
        }
        _ => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .try_init()
        }
    }
    .context("Failed to install tracing subscriber")
}
