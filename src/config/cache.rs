//! Active-call cache configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Which cache adapter to run
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Redis,
}

/// Cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Cache backend selection
    #[serde(default)]
    pub backend: CacheBackend,

    /// Redis URL, required for the redis backend
    pub redis_url: Option<String>,

    /// Per-call TTL in seconds
    #[serde(default = "default_call_ttl")]
    pub call_ttl_secs: u64,
}

impl CacheConfig {
    pub fn call_ttl(&self) -> Duration {
        Duration::from_secs(self.call_ttl_secs)
    }

    /// Validate cache configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.call_ttl_secs == 0 {
            return Err(ValidationError::InvalidCallTtl);
        }
        if self.backend == CacheBackend::Redis {
            match &self.redis_url {
                None => return Err(ValidationError::MissingRedisUrl),
                Some(url) if !url.starts_with("redis://") && !url.starts_with("rediss://") => {
                    return Err(ValidationError::InvalidRedisUrl)
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            redis_url: None,
            call_ttl_secs: default_call_ttl(),
        }
    }
}

fn default_call_ttl() -> u64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend_needs_no_url() {
        assert!(CacheConfig::default().validate().is_ok());
    }

    #[test]
    fn test_redis_backend_requires_url() {
        let config = CacheConfig {
            backend: CacheBackend::Redis,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redis_url_scheme_is_checked() {
        let config = CacheConfig {
            backend: CacheBackend::Redis,
            redis_url: Some("http://localhost:6379".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CacheConfig {
            backend: CacheBackend::Redis,
            redis_url: Some("redis://localhost:6379".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let config = CacheConfig {
            call_ttl_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
