//! Bounded retry for coordinator transport failures

use super::CoordinatorError;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Error text fragments that mean the server hung up mid-exchange
const PREMATURE_CLOSE_MARKERS: &[&str] = &[
    "eof",
    "connection closed",
    "connection reset",
    "incomplete message",
    "broken pipe",
];

/// Fixed-backoff retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff: Duration::from_secs(5),
        }
    }
}

/// Whether `text` describes a connection closed before the response completed
pub fn is_premature_close(text: &str) -> bool {
    let text = text.to_ascii_lowercase();
    PREMATURE_CLOSE_MARKERS
        .iter()
        .any(|marker| text.contains(marker))
}

/// Display an error together with its sources
pub(crate) fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// Run `call`, retrying premature-close failures per `policy`
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    endpoint: &str,
    mut call: F,
) -> Result<T, CoordinatorError>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut retries_left = policy.max_retries;

    loop {
        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let reason = error_chain(&err);
        if retries_left > 0 && is_premature_close(&reason) {
            info!(endpoint, error = %reason, retries_left, "Coordinator call failed, retrying");
            tokio::time::sleep(policy.backoff).await;
            retries_left -= 1;
            continue;
        }

        let attempts = policy.max_retries - retries_left + 1;
        warn!(endpoint, error = %reason, attempts, "Coordinator call failed");

        return Err(CoordinatorError::CoordinatorUnreachable {
            endpoint: endpoint.to_string(),
            attempts,
            reason,
        });
    }
}
