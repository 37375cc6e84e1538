//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use filegate_metadata::MetadataError;
use filegate_signer::TokenError;
use filegate_upstream::UpstreamError;
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Always false.
    pub ok: bool,
    /// Numeric error code for programmatic handling.
    pub error_code: u16,
    /// Human-readable error message.
    pub description: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing parameter: {0}")]
    MissingParameter(String),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("invalid mode: {0}")]
    InvalidMode(String),

    #[error("malformed token: expected 3 parts, got {parts}")]
    MalformedToken { parts: usize },

    #[error("token signature mismatch")]
    SignatureMismatch,

    #[error("file too large: {size} bytes exceeds the {ceiling} byte streaming limit")]
    PayloadTooLarge { size: u64, ceiling: u64 },

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("unknown resource kind: {0}")]
    UnknownResourceKind(String),

    #[error("upstream unavailable: {message}")]
    UpstreamUnavailable {
        status: Option<u16>,
        message: String,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Wrap an upstream failure, keeping the status the upstream reported.
    pub fn upstream(err: UpstreamError) -> Self {
        Self::UpstreamUnavailable {
            status: err.status(),
            message: err.to_string(),
        }
    }

    /// Stable label used for metrics.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingParameter(_) => "missing_parameter",
            Self::MethodNotAllowed(_) => "method_not_allowed",
            Self::InvalidMode(_) => "invalid_mode",
            Self::MalformedToken { .. } => "malformed_token",
            Self::SignatureMismatch => "signature_mismatch",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::ResourceNotFound(_) => "resource_not_found",
            Self::UnknownResourceKind(_) => "unknown_resource_kind",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Numeric code carried in the response body.
    pub fn error_code(&self) -> u16 {
        match self {
            Self::MissingParameter(_) => 404,
            Self::MethodNotAllowed(_) => 405,
            Self::InvalidMode(_) => 408,
            Self::MalformedToken { .. } | Self::SignatureMismatch => 407,
            Self::PayloadTooLarge { .. } => 410,
            Self::ResourceNotFound(_) => 411,
            Self::UnknownResourceKind(_) => 406,
            Self::UpstreamUnavailable { .. } => 502,
            Self::Internal(_) => 500,
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingParameter(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::InvalidMode(_) => StatusCode::BAD_REQUEST,
            Self::MalformedToken { .. } | Self::SignatureMismatch => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            Self::UnknownResourceKind(_) => StatusCode::NOT_ACCEPTABLE,
            Self::UpstreamUnavailable { status, .. } => status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::MalformedToken { parts } => Self::MalformedToken { parts },
            TokenError::SignatureMismatch => Self::SignatureMismatch,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<MetadataError> for ApiError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::NotFound(what) => Self::ResourceNotFound(what),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::NotFound(what) => Self::ResourceNotFound(what),
            UpstreamError::UnknownKind(kind) => Self::UnknownResourceKind(kind),
            other => Self::upstream(other),
        }
    }
}

impl From<filegate_core::Error> for ApiError {
    fn from(err: filegate_core::Error) -> Self {
        match err {
            filegate_core::Error::InvalidMode(mode) => Self::InvalidMode(mode),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            ok: false,
            error_code: self.error_code(),
            description: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
