//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::*;
use crate::error::ConfigError;

/// Runtime configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Records per message-list page.
    pub page_size: usize,
    /// Delay between delivered and read confirmations on the fallback path.
    pub ack_read_delay: Duration,
    /// Base URL of the collection-delete service.
    pub delete_service_url: String,
    /// Request timeout for the collection-delete service.
    pub delete_timeout: Duration,
    /// Directory of the LMDB preference store.
    pub preferences_path: PathBuf,
    /// LMDB map size in megabytes.
    pub preferences_max_size_mb: usize,
    /// Buffered events per subscriber on the sync event bus.
    pub event_channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            ack_read_delay: Duration::from_millis(DEFAULT_ACK_READ_DELAY_MS),
            delete_service_url: DEFAULT_DELETE_SERVICE_URL.to_string(),
            delete_timeout: Duration::from_secs(DEFAULT_DELETE_TIMEOUT_SECS),
            preferences_path: PathBuf::from(DEFAULT_PREFERENCES_PATH),
            preferences_max_size_mb: DEFAULT_PREFERENCES_MAX_SIZE_MB,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create SyncConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `CONVOY_PAGE_SIZE` (default: 20)
    /// - `CONVOY_ACK_READ_DELAY_MS` (default: 1000)
    /// - `CONVOY_DELETE_SERVICE_URL` (default: http://localhost:8085)
    /// - `CONVOY_DELETE_TIMEOUT_SECS` (default: 30)
    /// - `CONVOY_PREFS_PATH` (default: ./convoy-prefs)
    /// - `CONVOY_PREFS_MAX_SIZE_MB` (default: 4)
    /// - `CONVOY_EVENT_CHANNEL_CAPACITY` (default: 256)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            page_size: env_parse("CONVOY_PAGE_SIZE").unwrap_or(defaults.page_size),
            ack_read_delay: env_parse("CONVOY_ACK_READ_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.ack_read_delay),
            delete_service_url: std::env::var("CONVOY_DELETE_SERVICE_URL")
                .unwrap_or(defaults.delete_service_url),
            delete_timeout: env_parse("CONVOY_DELETE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.delete_timeout),
            preferences_path: std::env::var("CONVOY_PREFS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.preferences_path),
            preferences_max_size_mb: env_parse("CONVOY_PREFS_MAX_SIZE_MB")
                .unwrap_or(defaults.preferences_max_size_mb),
            event_channel_capacity: env_parse("CONVOY_EVENT_CHANNEL_CAPACITY")
                .unwrap_or(defaults.event_channel_capacity),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_ack_read_delay(mut self, delay: Duration) -> Self {
        self.ack_read_delay = delay;
        self
    }

    pub fn with_delete_service_url(mut self, url: impl Into<String>) -> Self {
        self.delete_service_url = url.into();
        self
    }

    pub fn with_preferences_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.preferences_path = path.into();
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::InvalidValue {
                field: "page_size".to_string(),
                value: self.page_size.to_string(),
                reason: format!("must be between 1 and {MAX_PAGE_SIZE}"),
            });
        }
        if self.delete_service_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "delete_service_url".to_string(),
            });
        }
        if self.preferences_max_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "preferences_max_size_mb".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "event_channel_capacity".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
