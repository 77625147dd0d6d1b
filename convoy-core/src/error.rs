//! Error types for Convoy operations

use thiserror::Error;

/// Remote store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Network or backend hiccup; callers fall back to the local cache.
    #[error("Store unavailable at {path}: {reason}")]
    Unavailable { path: String, reason: String },

    #[error("Document not found: {path}")]
    NotFound { path: String },

    #[error("Permission denied for {path}")]
    PermissionDenied { path: String },

    #[error("Operation on {path} was cancelled")]
    Cancelled { path: String },

    #[error("Store backend error: {reason}")]
    Backend { reason: String },
}

impl StoreError {
    pub fn unavailable(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Transient failures are recovered locally by reading the cache.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Failure to decode a store document into a domain record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Required field missing in {path}: {field}")]
    MissingField { path: String, field: String },

    #[error("Invalid value for {field} in {path}: {reason}")]
    InvalidField {
        path: String,
        field: String,
        reason: String,
    },
}

/// Local preference store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PreferenceError {
    #[error("Failed to open preference store: {0}")]
    Open(String),

    #[error("Preference transaction failed: {0}")]
    Transaction(String),

    #[error("Preference value for {key} is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Returned by resolution and staleness operations when the caller cancelled
/// the work. Every other failure is folded into the result itself.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq, Default)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Master error type for all Convoy errors.
#[derive(Debug, Clone, Error)]
pub enum ConvoyError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Preference error: {0}")]
    Preference(#[from] PreferenceError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Convoy operations.
pub type ConvoyResult<T> = Result<T, ConvoyError>;

/// Result type alias for remote store calls.
pub type StoreResult<T> = Result<T, StoreError>;
