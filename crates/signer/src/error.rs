//! Token codec error types.

use thiserror::Error;

/// Token codec errors.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token: expected 3 dot-separated parts, got {parts}")]
    MalformedToken { parts: usize },

    #[error("token signature mismatch")]
    SignatureMismatch,

    #[error("invalid resource identifier: {0}")]
    InvalidIdentifier(String),

    #[error("secret key error: {0}")]
    Secret(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for token operations.
pub type TokenResult<T> = std::result::Result<T, TokenError>;
