//! Error types for the rating engine
//!
//! Per-comparison and per-athlete problems never surface here: they degrade
//! into exclusions or reduced confidence. Only structurally invalid input
//! (scope, configuration, session shape) and storage failures are errors.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for the seat-racing engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid rating scope: {reason}")]
    InvalidScope { reason: String },

    #[error("Invalid seat race session {session_id}: {reason}")]
    InvalidSession { session_id: String, reason: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Rating store error: {message}")]
    StorageError { message: String },

    #[error("Internal engine error: {message}")]
    InternalError { message: String },
}
