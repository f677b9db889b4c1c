//! Tracing subscriber initialization.

use crate::config::LogFormat;
use policydesk_core::{ConfigError, DeskResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "policydesk=info";

/// Filter from `POLICYDESK_LOG`, then `RUST_LOG`, then the default.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("POLICYDESK_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Call once at startup.
pub fn init_tracing(format: LogFormat) -> DeskResult<()> {
    let registry = tracing_subscriber::registry().with(env_filter());
    let result = match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Plain => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init(),
    };
    result.map_err(|e| ConfigError::InvalidValue {
        field: "log_format".to_string(),
        reason: format!("failed to init subscriber: {}", e),
    })?;

    tracing::info!(format = ?format, "Tracing initialized");
    Ok(())
}
