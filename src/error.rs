//! Crate-wide error type.

use thiserror::Error;

/// Shared result type.
pub type Result<T> = std::result::Result<T, LatencyError>;

#[derive(Debug, Error)]
pub enum LatencyError {
    /// Invalid or unparsable configuration value.
    #[error("config: {0}")]
    Config(String),
    /// The metrics sink refused or failed a measurement.
    #[error("sink failed for {name}: {reason}")]
    Sink { name: String, reason: String },
    /// The flush task is no longer running.
    #[error("flusher stopped")]
    FlusherStopped,
    #[error("internal: {0}")]
    Internal(String),
}

impl LatencyError {
    pub fn sink(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Sink {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
