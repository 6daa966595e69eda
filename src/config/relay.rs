//! Event relay configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::adapters::relay::{BrokerConfig, ReconnectPolicy};

/// Relay configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Maximum in-flight unsettled deliveries
    #[serde(default = "default_prefetch")]
    pub prefetch: usize,

    /// Delivery attempts before dead-lettering
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Dead-letter queue capacity
    #[serde(default = "default_dead_letter_capacity")]
    pub dead_letter_capacity: usize,

    /// Base reconnect backoff in milliseconds
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,

    /// Reconnect backoff cap in seconds
    #[serde(default = "default_reconnect_cap_secs")]
    pub reconnect_cap_secs: u64,

    /// Reconnect attempt budget
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
}

impl RelayConfig {
    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            prefetch: self.prefetch,
            max_attempts: self.max_attempts,
            dead_letter_capacity: self.dead_letter_capacity,
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(self.reconnect_base_ms),
            max_delay: Duration::from_secs(self.reconnect_cap_secs),
            max_attempts: self.reconnect_attempts,
        }
    }

    /// Validate relay configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.prefetch == 0 {
            return Err(ValidationError::InvalidPrefetch);
        }
        if self.max_attempts == 0 || self.reconnect_attempts == 0 {
            return Err(ValidationError::InvalidRetryBudget);
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            prefetch: default_prefetch(),
            max_attempts: default_max_attempts(),
            dead_letter_capacity: default_dead_letter_capacity(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_cap_secs: default_reconnect_cap_secs(),
            reconnect_attempts: default_reconnect_attempts(),
        }
    }
}

fn default_prefetch() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_dead_letter_capacity() -> usize {
    256
}

fn default_reconnect_base_ms() -> u64 {
    500
}

fn default_reconnect_cap_secs() -> u64 {
    30
}

fn default_reconnect_attempts() -> u32 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(RelayConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_prefetch_rejected() {
        let config = RelayConfig {
            prefetch: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_retry_budget_rejected() {
        let config = RelayConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reconnect_policy_conversion() {
        let policy = RelayConfig::default().reconnect_policy();
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert_eq!(policy.max_attempts, 10);
    }

    #[test]
    fn test_broker_config_conversion() {
        let broker = RelayConfig::default().broker_config();
        assert_eq!(broker.prefetch, 10);
        assert_eq!(broker.max_attempts, 3);
        assert_eq!(broker.dead_letter_capacity, 256);
    }
}
