use super::models::Config;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("No account email configured (set coordinator.email or PINCAST_EMAIL)")]
    MissingEmail,

    #[error("Account email '{0}' is not an email address")]
    InvalidEmail(String),

    #[error("{field} '{value}' is not a valid URL: {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid URL scheme '{scheme}' for {field}, expected 'http' or 'https'")]
    InvalidUrlScheme { field: &'static str, scheme: String },

    #[error("{field} must be positive")]
    NotPositive { field: &'static str },

    #[error("idle_interval_secs ({idle}) must not exceed interval_secs ({interval})")]
    IdleIntervalTooLong { idle: u64, interval: u64 },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_account(config)?;
    validate_url("node.api_url", &config.node.api_url)?;
    validate_url("coordinator.base_url", &config.coordinator.base_url)?;
    validate_durations(config)?;
    validate_schedule(config)?;
    Ok(())
}

fn validate_account(config: &Config) -> Result<(), ValidationError> {
    let email = config.coordinator.email.trim();
    if email.is_empty() {
        return Err(ValidationError::MissingEmail);
    }
    if !email.contains('@') {
        return Err(ValidationError::InvalidEmail(email.to_string()));
    }
    Ok(())
}

fn validate_url(field: &'static str, value: &str) -> Result<(), ValidationError> {
    let url = Url::parse(value).map_err(|e| ValidationError::InvalidUrl {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ValidationError::InvalidUrlScheme {
            field,
            scheme: scheme.to_string(),
        }),
    }
}

fn validate_durations(config: &Config) -> Result<(), ValidationError> {
    let fields = [
        ("node.timeout_secs", config.node.timeout_secs),
        ("coordinator.timeout_secs", config.coordinator.timeout_secs),
        ("coordinator.retry_backoff_ms", config.coordinator.retry_backoff_ms),
        ("schedule.interval_secs", config.schedule.interval_secs),
        ("schedule.idle_interval_secs", config.schedule.idle_interval_secs),
    ];

    for (field, value) in fields {
        if value == 0 {
            return Err(ValidationError::NotPositive { field });
        }
    }
    Ok(())
}

fn validate_schedule(config: &Config) -> Result<(), ValidationError> {
    let schedule = &config.schedule;
    if schedule.idle_interval_secs > schedule.interval_secs {
        return Err(ValidationError::IdleIntervalTooLong {
            idle: schedule.idle_interval_secs,
            interval: schedule.interval_secs,
        });
    }
    Ok(())
}
