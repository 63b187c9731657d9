//! Shared reqwest client construction

use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("building HTTP client failed: {0}")]
pub struct ClientBuildError(#[from] reqwest::Error);

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    /// Bounds the whole exchange, body transfer included
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(600),
            user_agent: concat!("pincast/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    pub fn with_timeout(request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            ..Self::default()
        }
    }

    /// Build a client honouring this configuration
    pub fn build(&self) -> Result<Client, ClientBuildError> {
        let client = Client::builder()
            .connect_timeout(self.connect_timeout.min(self.request_timeout))
            .timeout(self.request_timeout)
            .user_agent(&self.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(client)
    }
}
