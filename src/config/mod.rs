//! Configuration management for pincast
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use pincast::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Storage node at: {}", config.node.api_url);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `PINCAST__<section>__<key>`
//!
//! Examples:
//! - `PINCAST__NODE__API_URL=http://ipfs:5001`
//! - `PINCAST__COORDINATOR__EMAIL=host@example.com`
//! - `PINCAST__SCHEDULE__INTERVAL_SECS=300`
//!
//! `PINCAST_EMAIL` is accepted as a shorthand for the account email.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/pincast.toml`.
//! This can be overridden using the `PINCAST_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use models::{Config, CoordinatorConfig, NodeConfig, ScheduleConfig, TelemetryConfig};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`PINCAST__*`)
    /// 2. TOML file (default: `config/pincast.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(sources::default_path())
    }

    /// Like [`Config::load`] but reading the TOML file at `path`
    pub fn load_with(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path, skipping `.env` and
    /// `PINCAST_EMAIL`
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
