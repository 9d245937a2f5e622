//! Error types for session setup.

use logcodec_core::error::ReconcileError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Parse error in session config: {0}")]
    Parse(String),

    #[error("Invalid config field '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that prevent a session from opening.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Could not resolve the active instance: {0}")]
    Instance(#[from] ReconcileError),

    #[error("Log source delivers program {actual}, session is configured for {expected}")]
    ProgramMismatch { expected: String, actual: String },
}
