//! Error types shared across the call-sync pipeline.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;

/// Error codes organized by failure category.
///
/// The transient/permanent split drives the relay consumer's retry
/// decision: transient failures are nacked for redelivery, permanent
/// ones are rejected to the dead-letter queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Upstream (CAD API) failures
    UpstreamUnavailable,
    UpstreamAuth,

    // Transport failures
    RelayUnavailable,
    CacheError,

    // Payload failures
    SerializationFailed,
    InvalidPayload,

    // Catch-all
    InternalError,
}

impl ErrorCode {
    /// Whether a failure with this code is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorCode::UpstreamUnavailable | ErrorCode::RelayUnavailable | ErrorCode::CacheError
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            ErrorCode::UpstreamAuth => "UPSTREAM_AUTH",
            ErrorCode::RelayUnavailable => "RELAY_UNAVAILABLE",
            ErrorCode::CacheError => "CACHE_ERROR",
            ErrorCode::SerializationFailed => "SERIALIZATION_FAILED",
            ErrorCode::InvalidPayload => "INVALID_PAYLOAD",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Standard pipeline error with code, message, and optional details.
#[derive(Debug, Clone)]
pub struct PipelineError {
    pub code: ErrorCode,
    pub message: String,
    pub details: HashMap<String, String>,
}

impl PipelineError {
    /// Creates a new pipeline error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: HashMap::new(),
        }
    }

    /// Creates an upstream-unavailable error (timeout, 5xx, connect failure).
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamUnavailable, message)
    }

    /// Creates a cache transport error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CacheError, message)
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SerializationFailed, message)
    }

    /// Adds a detail to the error.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Whether this error is worth retrying.
    pub fn is_transient(&self) -> bool {
        self.code.is_transient()
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for PipelineError {}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_error_displays_code_and_message() {
        let err = PipelineError::upstream("CAD API timed out");
        assert_eq!(format!("{}", err), "[UPSTREAM_UNAVAILABLE] CAD API timed out");
    }

    #[test]
    fn with_detail_adds_detail() {
        let err = PipelineError::cache("connection refused")
            .with_detail("operation", "put")
            .with_detail("call_id", "C-17");

        assert_eq!(err.details.get("operation"), Some(&"put".to_string()));
        assert_eq!(err.details.get("call_id"), Some(&"C-17".to_string()));
    }

    #[test]
    fn transient_codes_are_retryable() {
        assert!(ErrorCode::UpstreamUnavailable.is_transient());
        assert!(ErrorCode::RelayUnavailable.is_transient());
        assert!(ErrorCode::CacheError.is_transient());
    }

    #[test]
    fn permanent_codes_are_not_retryable() {
        assert!(!ErrorCode::SerializationFailed.is_transient());
        assert!(!ErrorCode::InvalidPayload.is_transient());
        assert!(!ErrorCode::UpstreamAuth.is_transient());
    }

    #[test]
    fn serde_json_error_converts_to_serialization_failed() {
        let parse_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: PipelineError = parse_err.into();
        assert_eq!(err.code, ErrorCode::SerializationFailed);
    }
}
