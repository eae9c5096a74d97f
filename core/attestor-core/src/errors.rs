//! Error types for core primitives

use thiserror::Error;

/// Core primitive errors
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed hex input
    #[error("Invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Hex string with an odd number of digits
    #[error("Odd-length hex string: {0}")]
    OddLengthHex(String),

    /// Value does not have the expected byte length
    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
