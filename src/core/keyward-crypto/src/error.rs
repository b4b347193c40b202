//! Cryptographic error types.

use thiserror::Error;

/// Errors that can occur in cryptographic helpers.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid address encoding or length.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
