//! Error types for the crisis corpus tooling.
//!
//! This module defines a unified error enum covering configuration, I/O,
//! corpus synchronization, and serialization failures.

use thiserror::Error;

/// Unified error type for the crisis corpus tooling.
///
/// Public entry points return `Result<T, AppError>`.
/// We never panic, errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Corpus synchronization and retrieval index errors
    #[error("Corpus error: {0}")]
    Corpus(String),

    /// Persisted state (.env store) errors
    #[error("State error: {0}")]
    State(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
