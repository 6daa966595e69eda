//! Application configuration module
//!
//! Type-safe configuration loading from environment variables using the
//! `config` and `dotenvy` crates. Configuration is loaded with the
//! `DISPATCH_CONSOLE_` prefix and nested values use double underscores
//! as separators.
//!
//! # Example
//!
//! ```no_run
//! use dispatch_console::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {}", config.server.socket_addr());
//! ```

mod cache;
mod cad;
mod error;
mod poller;
mod relay;
mod server;
mod webhook;

pub use cache::{CacheBackend, CacheConfig};
pub use cad::CadConfig;
pub use error::{ConfigError, ValidationError};
pub use poller::PollerConfig;
pub use relay::RelayConfig;
pub use server::{Environment, ServerConfig};
pub use webhook::WebhookConfig;

use serde::Deserialize;

/// Root application configuration
///
/// Contains all configuration sections for the dispatch console pipeline.
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream CAD API configuration
    pub cad: CadConfig,

    /// Active-call cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Event relay configuration
    #[serde(default)]
    pub relay: RelayConfig,

    /// Poller configuration
    #[serde(default)]
    pub poller: PollerConfig,

    /// Webhook ingress configuration
    pub webhook: WebhookConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `DISPATCH_CONSOLE` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `DISPATCH_CONSOLE__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `DISPATCH_CONSOLE__CAD__BASE_URL=...` -> `cad.base_url = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required environment variables are
    /// missing or values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("DISPATCH_CONSOLE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.cad.validate()?;
        self.cache.validate()?;
        self.relay.validate()?;
        self.poller.validate()?;
        self.webhook.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
