//! Tracing subscriber setup.
//!
//! Call [`init_tracing`] once at startup. A second call returns an error
//! instead of replacing the global subscriber.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "convoy_sync=info,convoy_storage=info,warn";

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Invalid log filter {filter:?}: {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Failed to init subscriber: {0}")]
    AlreadyInitialized(String),
}

/// Logging configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives. `CONVOY_LOG`, then `RUST_LOG`.
    pub filter: String,
    /// JSON lines instead of human-readable output (`CONVOY_LOG_FORMAT=json`).
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: std::env::var("CONVOY_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| DEFAULT_FILTER.to_string()),
            json: std::env::var("CONVOY_LOG_FORMAT")
                .map(|s| s.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }
}

impl TelemetryConfig {
    pub fn env_filter(&self) -> Result<EnvFilter, TelemetryError> {
        EnvFilter::try_new(&self.filter).map_err(|e| TelemetryError::InvalidFilter {
            filter: self.filter.clone(),
            reason: e.to_string(),
        })
    }
}

pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = config.env_filter()?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    result.map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))?;

    tracing::info!(filter = %config.filter, json = config.json, "tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_is_rejected() {
        let config = TelemetryConfig {
            filter: "convoy_sync=notalevel".to_string(),
            json: false,
        };
        assert!(matches!(
            config.env_filter(),
            Err(TelemetryError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn test_second_init_is_an_error() {
        let config = TelemetryConfig {
            filter: "warn".to_string(),
            json: true,
        };
        let _ = init_tracing(&config);
        assert!(matches!(
            init_tracing(&config),
            Err(TelemetryError::AlreadyInitialized(_))
        ));
    }
}
