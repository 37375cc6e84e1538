//! Upstream provider error types.

use thiserror::Error;

/// Upstream operation errors.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("resource not found upstream: {0}")]
    NotFound(String),

    #[error("unknown resource kind: {0}")]
    UnknownKind(String),

    #[error("upstream returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("upstream timed out: {0}")]
    Timeout(String),

    #[error("invalid upstream response: {0}")]
    Decode(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 error: {0}")]
    S3(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("configuration error: {0}")]
    Config(String),
}

impl UpstreamError {
    /// HTTP status the upstream reported, if it reported one.
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            UpstreamError::NotFound(_) => Some(404),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout(err.to_string())
        } else if err.is_decode() {
            UpstreamError::Decode(err.to_string())
        } else {
            UpstreamError::Transport(err.without_url().to_string())
        }
    }
}

/// Result type for upstream operations.
pub type UpstreamResult<T> = std::result::Result<T, UpstreamError>;
