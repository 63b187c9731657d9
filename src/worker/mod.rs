//! Work-cycle orchestrator
//!
//! A [`Worker`] runs one cycle at a time: read node status, ask the
//! coordinator for a job, execute every directive in it, report back.
//! [`runner::run`] repeats cycles on a schedule until shutdown.

mod cycle;
mod outcome;
pub mod runner;

pub use outcome::{JobKind, JobOutcome};

use crate::config::Config;
use crate::coordinator::{Account, Coordinator, CoordinatorClient, CoordinatorError, RetryPolicy};
use crate::fetch::ContentFetcher;
use crate::http::{ClientBuildError, HttpConfig};
use crate::observability::Observer;
use crate::storage::{KuboClient, StorageError, StorageNode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// How a cycle ended, when it did not fail outright
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The coordinator had no work
    Idle,
    /// Report sent and every directive succeeded
    Complete,
    /// Report sent but at least one directive failed
    Incomplete,
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("reading node status failed: {0}")]
    NodeStatus(#[source] StorageError),

    #[error("requesting work failed: {0}")]
    RequestWork(#[source] CoordinatorError),

    #[error("reporting results failed: {0}")]
    Report(#[source] CoordinatorError),
}

/// Scheduling between cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Minimum spacing between the starts of two working cycles
    pub interval: Duration,
    /// Pause after a cycle that found no work
    pub idle_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(600),
            idle_interval: Duration::from_secs(60),
        }
    }
}

pub struct Worker {
    node: Arc<dyn StorageNode>,
    coordinator: Arc<dyn Coordinator>,
    fetcher: ContentFetcher,
    account: Account,
    observer: Arc<dyn Observer>,
}

impl Worker {
    pub fn new(
        node: Arc<dyn StorageNode>,
        coordinator: Arc<dyn Coordinator>,
        download_client: reqwest::Client,
        account: Account,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            fetcher: ContentFetcher::new(download_client, node.clone()),
            node,
            coordinator,
            account,
            observer,
        }
    }

    /// Wire a worker against the configured node and coordinator
    pub fn from_config(
        config: &Config,
        observer: Arc<dyn Observer>,
    ) -> Result<Self, ClientBuildError> {
        let node_http = HttpConfig::with_timeout(config.node.timeout());
        let http = HttpConfig::with_timeout(config.coordinator.timeout());

        let node = KuboClient::new(&config.node.api_url, &node_http)?;
        let coordinator = CoordinatorClient::new(
            &config.coordinator.base_url,
            &http,
            RetryPolicy {
                max_retries: config.coordinator.max_retries,
                backoff: config.coordinator.retry_backoff(),
            },
        )?;

        Ok(Self::new(
            Arc::new(node),
            Arc::new(coordinator),
            http.build()?,
            config.coordinator.account(),
            observer,
        ))
    }

    /// Storage node this worker drives
    pub fn node(&self) -> Arc<dyn StorageNode> {
        self.node.clone()
    }
}
