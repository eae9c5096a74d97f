//! Error types for the round lifecycle engine

use thiserror::Error;

/// Round lifecycle errors
#[derive(Error, Debug)]
pub enum RoundError {
    /// Chain connection call failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Round state store call failed
    #[error("Store error: {0}")]
    Store(String),

    /// Round initialization could not resolve the default voter set
    #[error("Initialization failed for round {round_id}: {reason}")]
    Initialization { round_id: u64, reason: String },

    /// Core primitive error
    #[error("Core error: {0}")]
    Core(#[from] attestor_core::CoreError),
}

/// Result type for round operations
pub type RoundResult<T> = Result<T, RoundError>;
