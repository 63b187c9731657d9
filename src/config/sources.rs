use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "PINCAST_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/pincast.toml";
const ENV_PREFIX: &str = "PINCAST";
const ENV_SEPARATOR: &str = "__";
const EMAIL_ENV_VAR: &str = "PINCAST_EMAIL";

/// Path of the config file when none is given explicitly
pub fn default_path() -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load(config_path: PathBuf) -> Result<Config, ConfigError> {
    // A missing .env is normal
    let _ = dotenvy::dotenv();

    let mut config = load_from_sources(config_path)?;
    load_account(&mut config, env::var(EMAIL_ENV_VAR).ok());

    Ok(config)
}

/// Fill the account email from the environment when the file left it out
fn load_account(config: &mut Config, email: Option<String>) {
    if !config.coordinator.email.trim().is_empty() {
        return;
    }
    if let Some(email) = email {
        config.coordinator.email = email.trim().to_string();
    }
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // PINCAST__COORDINATOR__EMAIL -> coordinator.email
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
