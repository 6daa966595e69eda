//! CAD API client configuration

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Upstream CAD API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CadConfig {
    /// Base URL of the CAD API
    pub base_url: String,

    /// Bearer credential for the CAD API
    pub api_key: Secret<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl CadConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate CAD configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ValidationError::InvalidCadUrl);
        }
        if self.api_key.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("cad.api_key"));
        }
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 120 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

fn default_request_timeout() -> u64 {
    10
}
