//! Core error types for covisit-core.
//!
//! This module defines the error hierarchy using thiserror. Each subsystem
//! (storage, networking, check-in lifecycle, reporting) has its own enum,
//! joined under [`CoreError`] for callers that cross subsystems.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for covisit-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Check-in lifecycle errors
    #[error("Check-in error: {0}")]
    CheckIn(#[from] CheckInError),

    /// Reporting errors
    #[error("Reporting error: {0}")]
    Report(#[from] ReportError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(#[from] rusqlite::Error),

    /// A stored value could not be decoded
    #[error("Corrupt value for key '{key}': {source}")]
    CorruptValue {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Filesystem failure while locating or creating the data directory
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Network-layer errors shared by the sync and reporting paths.
///
/// Parse failures are surfaced through the same channel as transport
/// failures -- the caller cannot act differently on either.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Connection or timeout failure
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx/304 HTTP status
    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    /// Malformed response body or token claims
    #[error("Malformed response payload")]
    Parse,

    /// Signed payload failed verification
    #[error("Payload signature verification failed")]
    Signature,
}

/// Check-in lifecycle errors.
#[derive(Error, Debug)]
pub enum CheckInError {
    /// A check-in is already active; it must be checked out first
    #[error("Already checked in")]
    AlreadyCheckedIn,

    /// No active check-in to operate on
    #[error("No active check-in")]
    NotCheckedIn,

    /// The record is missing a departure time
    #[error("Check-in has no departure time")]
    MissingDeparture,

    /// The presence-matching collaborator rejected the submission
    #[error(transparent)]
    Matching(#[from] MatchingError),

    /// Persistence failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Error produced by the presence-matching collaborator.
#[derive(Error, Debug)]
#[error("Presence matcher error: {0}")]
pub struct MatchingError(pub String);

/// Reporting-flow errors returned to the immediate caller for inline retry.
#[derive(Error, Debug)]
pub enum ReportError {
    /// The covid code was rejected as unknown or spent. Terminal for this
    /// code; never cached, never retried with the same code.
    #[error("Invalid covid code")]
    InvalidCode,

    /// Transport, status or parse failure during validation or submission
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Persistence failure while recording the report outcome
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
