//! Coordinator wire messages

use crate::storage::NodeStatus;
use serde::{Deserialize, Serialize};

/// `message` value the coordinator sends when there is nothing to do
pub const IDLE_MARKER: &str = "No Work";

/// Who is asking for work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub email: String,
    pub protocol_version: String,
}

/// Outbound payload for both the work request and the result report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkRequest {
    pub email: String,
    pub version: String,
    pub node_id: String,
    pub node_version: String,
    pub online: bool,
    pub peers: usize,

    pub downloaded: Option<String>,
    pub length: Option<u64>,
    pub error: bool,
    pub pinned: Option<String>,
    pub deleted: Option<String>,

    pub used: Option<u64>,
    pub avail: Option<u64>,
}

impl WorkRequest {
    /// Status-only request, as sent before any job has run
    pub fn new(account: &Account, status: &NodeStatus) -> Self {
        Self {
            email: account.email.clone(),
            version: account.protocol_version.clone(),
            node_id: status.identity.clone(),
            node_version: status.software_version.clone(),
            online: status.online,
            peers: status.peer_count,
            ..Self::default()
        }
    }

    /// Form fields in the coordinator's naming; unset outcome fields are omitted
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("email", self.email.clone()),
            ("version", self.version.clone()),
            ("ipfs_id", self.node_id.clone()),
            ("ipfs_ver", self.node_version.clone()),
            ("online", self.online.to_string()),
            ("peers", self.peers.to_string()),
        ];

        if let Some(downloaded) = &self.downloaded {
            fields.push(("downloaded", downloaded.clone()));
        }
        if let Some(length) = self.length {
            fields.push(("length", length.to_string()));
        }
        if self.error {
            fields.push(("error", "1".to_string()));
        }
        if let Some(pinned) = &self.pinned {
            fields.push(("pinned", pinned.clone()));
        }
        if let Some(deleted) = &self.deleted {
            fields.push(("deleted", deleted.clone()));
        }
        if let Some(used) = self.used {
            fields.push(("used", used.to_string()));
        }
        if let Some(avail) = self.avail {
            fields.push(("avail", avail.to_string()));
        }

        fields
    }
}

/// Job description returned by the request endpoint
///
/// Directives are independent: one response may ask for a download, a pin
/// and a delete at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Job {
    pub show: Option<String>,
    pub episode: Option<String>,
    pub download: Option<String>,
    pub filename: Option<String>,
    pub pin: Option<String>,
    pub delete: Option<String>,
    pub message: Option<String>,
}

/// Download directive; both halves are required
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadDirective<'a> {
    pub url: &'a str,
    pub filename: &'a str,
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.is_empty())
}

impl Job {
    pub fn is_idle(&self) -> bool {
        self.message.as_deref() == Some(IDLE_MARKER)
    }

    pub fn download(&self) -> Option<DownloadDirective<'_>> {
        Some(DownloadDirective {
            url: present(&self.download)?,
            filename: present(&self.filename)?,
        })
    }

    pub fn pin(&self) -> Option<&str> {
        present(&self.pin)
    }

    pub fn delete(&self) -> Option<&str> {
        present(&self.delete)
    }
}
