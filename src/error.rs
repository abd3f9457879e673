//! Error types for the activity histogram

use thiserror::Error;

/// Errors that can occur while configuring or feeding the histogram
#[derive(Debug, Error)]
pub enum HistogramError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid record at index {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Unknown histogram mode: {0}")]
    UnknownMode(String),

    #[error("Invalid interaction script: {0}")]
    InvalidScript(String),
}
