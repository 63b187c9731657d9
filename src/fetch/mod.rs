//! Content fetch-and-store
//!
//! Downloads episodes over HTTP and streams them straight into the storage
//! node, plus the pin-based fallback used when a download fails.

mod fallback;
mod pin;

pub use fallback::{CONTENT_PATH_PREFIX, embedded_content_address};
pub use pin::pin_and_resolve;

use crate::storage::{self, StorageError, StorageNode};
use futures::TryStreamExt;
use reqwest::Client;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetching {url} failed: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("storing content failed: {0}")]
    Storage(#[from] StorageError),
}

impl FetchError {
    fn fetch_failed(url: &str, reason: impl ToString) -> Self {
        FetchError::FetchFailed {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Content held by the node, as reported to the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContent {
    /// `<file-hash>/<directory-hash>`
    pub reference: String,
    pub length: u64,
}

/// Fetches remote content into a storage node
#[derive(Clone)]
pub struct ContentFetcher {
    http: Client,
    node: Arc<dyn StorageNode>,
}

impl ContentFetcher {
    pub fn new(http: Client, node: Arc<dyn StorageNode>) -> Self {
        Self { http, node }
    }

    /// GET `url` and stream the body into the node as `filename`
    pub async fn fetch_and_store(&self, url: &str, filename: &str) -> Result<StoredContent> {
        debug!(url, filename, "Starting download");

        let response = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::fetch_failed(url, "connection timeout")
            } else {
                FetchError::fetch_failed(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::fetch_failed(
                url,
                format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                ),
            ));
        }

        let content = response.bytes_stream().map_err(std::io::Error::other);
        let added = self.node.add_stream(Box::pin(content), filename).await?;

        // The add response reports the wrapped size, so ask the node instead
        let length = storage::file_size(self.node.as_ref(), &added.file.hash).await?;

        let stored = StoredContent {
            reference: format!("{}/{}", added.file.hash, added.directory.hash),
            length,
        };

        info!(url, reference = %stored.reference, length, "Download stored");

        Ok(stored)
    }
}
