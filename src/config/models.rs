use crate::coordinator::Account;
use crate::worker::WorkerConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Storage node RPC endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    #[serde(default = "default_node_api_url")]
    pub api_url: String,
    /// Adds of large episodes can take hours on slow disks
    #[serde(default = "default_node_timeout_secs")]
    pub timeout_secs: u64,
}

impl NodeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            api_url: default_node_api_url(),
            timeout_secs: default_node_timeout_secs(),
        }
    }
}

fn default_node_api_url() -> String {
    "http://127.0.0.1:5001".to_string()
}

fn default_node_timeout_secs() -> u64 {
    6 * 60 * 60
}

/// Coordinator service and account
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_coordinator_base_url")]
    pub base_url: String,
    /// Account email; may also come from `PINCAST_EMAIL`
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    /// Applies to coordinator calls and episode downloads
    #[serde(default = "default_coordinator_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl CoordinatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn account(&self) -> Account {
        Account {
            email: self.email.trim().to_string(),
            protocol_version: self.protocol_version.clone(),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            base_url: default_coordinator_base_url(),
            email: String::new(),
            protocol_version: default_protocol_version(),
            timeout_secs: default_coordinator_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_coordinator_base_url() -> String {
    "https://ipfspodcasting.net".to_string()
}

fn default_protocol_version() -> String {
    "0.6r".to_string()
}

fn default_coordinator_timeout_secs() -> u64 {
    600
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_backoff_ms() -> u64 {
    5000
}

/// Polling schedule
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_idle_interval_secs")]
    pub idle_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            idle_interval_secs: default_idle_interval_secs(),
        }
    }
}

impl From<&ScheduleConfig> for WorkerConfig {
    fn from(schedule: &ScheduleConfig) -> Self {
        Self {
            interval: Duration::from_secs(schedule.interval_secs),
            idle_interval: Duration::from_secs(schedule.idle_interval_secs),
        }
    }
}

fn default_interval_secs() -> u64 {
    600
}

fn default_idle_interval_secs() -> u64 {
    60
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Serve `/health` and `/metrics`
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: SocketAddr,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: default_metrics_enabled(),
            metrics_addr: default_metrics_addr(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9196))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.node.api_url, "http://127.0.0.1:5001");
        assert_eq!(config.node.timeout(), Duration::from_secs(21_600));
        assert_eq!(config.coordinator.base_url, "https://ipfspodcasting.net");
        assert_eq!(config.coordinator.protocol_version, "0.6r");
        assert_eq!(config.coordinator.retry_backoff(), Duration::from_secs(5));
        assert_eq!(config.coordinator.max_retries, 5);
        assert!(config.coordinator.email.is_empty());
        assert_eq!(config.telemetry.metrics_addr.to_string(), "0.0.0.0:9196");

        let schedule = WorkerConfig::from(&config.schedule);
        assert_eq!(schedule, WorkerConfig::default());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
[coordinator]
email = "host@example.com"

[schedule]
interval_secs = 300
            "#,
        )
        .unwrap();

        assert_eq!(config.coordinator.email, "host@example.com");
        assert_eq!(config.coordinator.timeout_secs, 600);
        assert_eq!(config.schedule.interval_secs, 300);
        assert_eq!(config.schedule.idle_interval_secs, 60);
    }

    #[test]
    fn test_account_from_config() {
        let coordinator = CoordinatorConfig {
            email: "host@example.com".to_string(),
            ..CoordinatorConfig::default()
        };

        let account = coordinator.account();
        assert_eq!(account.email, "host@example.com");
        assert_eq!(account.protocol_version, "0.6r");
    }

    #[test]
    fn test_account_email_is_trimmed() {
        let coordinator = CoordinatorConfig {
            email: "  host@example.com\n".to_string(),
            ..CoordinatorConfig::default()
        };

        assert_eq!(coordinator.account().email, "host@example.com");
    }
}
