//! Storage node facade
//!
//! Typed access to the content-addressed storage node (a Kubo RPC endpoint).
//! Every call is a single RPC round-trip; nothing is cached locally.

pub mod memory;
mod multipart;
mod rpc;

pub use multipart::{EncodeError, MultipartBody};
pub use rpc::KuboClient;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

/// Error text the node returns when asked to unpin something it does not hold
pub const NOT_PINNED_MESSAGE: &str = "not pinned or pinned indirectly";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage node unreachable ({command}): {message}")]
    NodeUnreachable { command: String, message: String },

    #[error("unexpected ls result for {reference}: {detail}")]
    MalformedLinks { reference: String, detail: String },

    #[error("malformed {command} response: {detail}")]
    MalformedResponse { command: String, detail: String },

    #[error("streaming upload body failed: {0}")]
    Encode(#[from] EncodeError),
}

impl StorageError {
    pub(crate) fn unreachable(command: &str, message: impl ToString) -> Self {
        StorageError::NodeUnreachable {
            command: command.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn malformed(command: &str, detail: impl ToString) -> Self {
        StorageError::MalformedResponse {
            command: command.to_string(),
            detail: detail.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Content handed to [`StorageNode::add_stream`]
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub id: String,
    pub agent_version: String,
    pub protocols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDiagnostics {
    pub software_version: String,
    pub online: bool,
}

/// Repository usage as reported by the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RepoUsage {
    pub used_bytes: u64,
    pub capacity_bytes: u64,
    pub object_count: u64,
}

/// Snapshot of node state sent with every coordinator call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub identity: String,
    pub software_version: String,
    pub online: bool,
    pub peer_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedEntry {
    pub name: String,
    pub hash: String,
    /// Size as reported by add; informational only
    pub size: Option<u64>,
}

/// The two records produced by a directory-wrapped add
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedEntries {
    pub file: AddedEntry,
    pub directory: AddedEntry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub name: String,
    pub hash: String,
    pub size: u64,
}

/// Operations the agent needs from the storage node
#[async_trait]
pub trait StorageNode: Send + Sync {
    async fn identity(&self) -> Result<NodeIdentity>;

    async fn diagnostics(&self) -> Result<NodeDiagnostics>;

    /// Number of active swarm connections
    async fn peer_count(&self) -> Result<usize>;

    async fn repo_stats(&self) -> Result<RepoUsage>;

    /// Stream `content` into the node as `filename`, wrapped in a directory
    async fn add_stream(&self, content: ByteStream, filename: &str) -> Result<AddedEntries>;

    async fn pin_add(&self, reference: &str) -> Result<()>;

    /// Unpin `reference`; content that is not pinned counts as removed
    async fn pin_remove(&self, reference: &str) -> Result<()>;

    /// Links of the single object named by `reference`
    async fn list_links(&self, reference: &str) -> Result<Vec<Link>>;
}

/// Gather identity, diagnostics and peer count into one status record
pub async fn node_status(node: &dyn StorageNode) -> Result<NodeStatus> {
    let identity = node.identity().await?;
    let diagnostics = node.diagnostics().await?;
    let peer_count = node.peer_count().await?;

    Ok(NodeStatus {
        identity: identity.id,
        software_version: diagnostics.software_version,
        online: diagnostics.online,
        peer_count,
    })
}

/// Total byte length of a stored file, summed over its links
pub async fn file_size(node: &dyn StorageNode, hash: &str) -> Result<u64> {
    let links = node.list_links(hash).await?;
    Ok(links.iter().map(|link| link.size).sum())
}
