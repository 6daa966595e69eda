//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid CAD API base URL")]
    InvalidCadUrl,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Redis backend selected but no Redis URL configured")]
    MissingRedisUrl,

    #[error("Poll interval must be between 1 second and 1 hour")]
    InvalidPollInterval,

    #[error("Call TTL must be positive")]
    InvalidCallTtl,

    #[error("Relay prefetch must be positive")]
    InvalidPrefetch,

    #[error("Relay retry budget must be positive")]
    InvalidRetryBudget,

    #[error("Heartbeat interval must be positive")]
    InvalidHeartbeat,
}
