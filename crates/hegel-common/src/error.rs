//! Error types for Hegel
//!
//! This module defines the common error type used throughout the service.

use thiserror::Error;

/// Common result type for Hegel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Hegel
#[derive(Debug, Error)]
pub enum Error {
    // Metadata resolution errors
    #[error("invalid metadata item: {0}")]
    InvalidMetadataItem(String),

    #[error("query failed: {0}")]
    Query(String),

    // Backend errors
    #[error("hardware not found for {0}")]
    HardwareNotFound(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("malformed hardware record: {0}")]
    MalformedRecord(String),

    // Startup errors
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create an invalid metadata item error
    pub fn invalid_item(item: impl Into<String>) -> Self {
        Self::InvalidMetadataItem(item.into())
    }

    /// Create a query evaluation error
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Create an invalid filter error
    pub fn invalid_filter(msg: impl Into<String>) -> Self {
        Self::InvalidFilter(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if this error is fatal at startup
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidFilter(_) | Self::Configuration(_))
    }

    /// Get the HTTP status code returned to metadata callers
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidMetadataItem(_) => 404,
            Self::Query(_)
            | Self::HardwareNotFound(_)
            | Self::BackendUnavailable(_)
            | Self::MalformedRecord(_)
            | Self::InvalidFilter(_)
            | Self::Configuration(_) => 500,
        }
    }
}
