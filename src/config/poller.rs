//! Poller configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Poller configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    /// Seconds between poll cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl PollerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Validate poller configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.poll_interval_secs == 0 || self.poll_interval_secs > 3600 {
            return Err(ValidationError::InvalidPollInterval);
        }
        Ok(())
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
        }
    }
}

fn default_poll_interval() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_interval() {
        let config = PollerConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_out_of_range_intervals_rejected() {
        assert!(PollerConfig {
            poll_interval_secs: 0
        }
        .validate()
        .is_err());
        assert!(PollerConfig {
            poll_interval_secs: 7200
        }
        .validate()
        .is_err());
    }
}
