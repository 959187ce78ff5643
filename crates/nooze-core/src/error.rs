//! Core error types for nooze-core.
//!
//! Errors are grouped by the layer that raises them. Platform failures
//! (`PlatformError`) are almost always logged and absorbed by the
//! component that observes them; they only reach the caller when no
//! fallback exists.

use std::path::PathBuf;
use thiserror::Error;

use crate::alarm::AlarmId;

/// Core error type for nooze-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Challenge input errors
    #[error("Challenge error: {0}")]
    Challenge(#[from] ChallengeError),

    /// Platform collaborator errors
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

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

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be decoded
    #[error("Corrupt value for key '{key}': {value}")]
    CorruptValue { key: String, value: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,
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

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
}

/// Validation errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// Hour outside 0..=23
    #[error("Invalid hour {0}: expected 0-23")]
    InvalidHour(u32),

    /// Minute outside 0..=59
    #[error("Invalid minute {0}: expected 0-59")]
    InvalidMinute(u32),

    /// Unparseable wall-clock time
    #[error("Invalid time '{0}': expected HH:MM")]
    InvalidTimeFormat(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Errors raised while answering the challenge.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChallengeError {
    /// No challenge has been started for the active alarm
    #[error("No challenge in progress")]
    NotStarted,

    /// A challenge was requested while no alarm is active
    #[error("No alarm is ringing")]
    NoActiveAlarm,

    /// Blank input
    #[error("Please enter an answer")]
    EmptyAnswer,

    /// Input that is not an integer
    #[error("Please enter a valid number (got '{0}')")]
    NotANumber(String),
}

/// Errors reported by platform collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The requested wake-up precision was not granted
    #[error("Wake-up precision '{0}' not granted")]
    PrecisionDenied(&'static str),

    /// No wake-up timer registration was possible for the alarm
    #[error("No wake-up timer available for alarm {0}")]
    TimerUnavailable(AlarmId),

    /// A capability the platform does not provide
    #[error("Capability unavailable: {0}")]
    Unavailable(String),

    /// Playback engine failure
    #[error("Playback failed: {0}")]
    Playback(String),

    /// Vibration engine failure
    #[error("Vibration failed: {0}")]
    Vibration(String),

    /// Alert surface (ring UI / notification) failure
    #[error("Alert surface failed: {0}")]
    Surface(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg) => {
                if code.code == rusqlite::ErrorCode::DatabaseLocked
                    || code.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for CoreError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        CoreError::Custom(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
