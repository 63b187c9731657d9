//! Kubo HTTP RPC client

use super::multipart::MultipartBody;
use super::{
    AddedEntries, AddedEntry, ByteStream, Link, NodeDiagnostics, NodeIdentity, NOT_PINNED_MESSAGE,
    RepoUsage, Result, StorageError, StorageNode,
};
use crate::http::{ClientBuildError, HttpConfig};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Error envelope the node returns alongside non-2xx statuses
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "AgentVersion", default)]
    agent_version: String,
    #[serde(rename = "Protocols", default)]
    protocols: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct DiagSysResponse {
    ipfs_version: String,
    net: DiagNet,
}

#[derive(Debug, Deserialize)]
struct DiagNet {
    #[serde(default)]
    online: bool,
}

#[derive(Debug, Deserialize)]
struct SwarmPeersResponse {
    #[serde(rename = "Peers", default)]
    peers: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct RepoStatResponse {
    #[serde(rename = "RepoSize")]
    repo_size: u64,
    #[serde(rename = "StorageMax")]
    storage_max: u64,
    #[serde(rename = "NumObjects", default)]
    num_objects: u64,
}

#[derive(Debug, Deserialize)]
struct AddRecord {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Hash")]
    hash: String,
    /// Kubo encodes this as a decimal string
    #[serde(rename = "Size", default)]
    size: Option<String>,
}

impl From<AddRecord> for AddedEntry {
    fn from(record: AddRecord) -> Self {
        Self {
            size: record.size.and_then(|s| s.parse().ok()),
            name: record.name,
            hash: record.hash,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LsResponse {
    #[serde(rename = "Objects", default)]
    objects: Option<Vec<LsObject>>,
}

#[derive(Debug, Deserialize)]
struct LsObject {
    #[serde(rename = "Links", alias = "links", default)]
    links: Option<Vec<LsLink>>,
}

#[derive(Debug, Deserialize)]
struct LsLink {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Hash")]
    hash: String,
    #[serde(rename = "Size", default)]
    size: u64,
}

/// Storage node reached over the Kubo RPC API (`/api/v0/...`)
#[derive(Clone)]
pub struct KuboClient {
    client: Client,
    api_url: String,
}

impl KuboClient {
    pub fn new(api_url: &str, http: &HttpConfig) -> std::result::Result<Self, ClientBuildError> {
        Ok(Self {
            client: http.build()?,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, command: &str) -> RequestBuilder {
        // Kubo only accepts POST on RPC endpoints
        self.client.post(format!("{}/api/v0/{}", self.api_url, command))
    }

    /// Send and check both transport and envelope errors
    async fn send(&self, command: &str, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| StorageError::unreachable(command, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => envelope.message,
            Err(_) => format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            ),
        };

        Err(StorageError::unreachable(command, message))
    }

    async fn call<T: DeserializeOwned>(&self, command: &str, args: &[(&str, &str)]) -> Result<T> {
        let response = self.send(command, self.request(command).query(args)).await?;

        response
            .json::<T>()
            .await
            .map_err(|e| StorageError::malformed(command, e))
    }

    async fn call_discarding(&self, command: &str, args: &[(&str, &str)]) -> Result<()> {
        let response = self.send(command, self.request(command).query(args)).await?;
        // A reply cut short means the command may not have taken effect
        response
            .bytes()
            .await
            .map_err(|e| StorageError::unreachable(command, e))?;
        Ok(())
    }
}

#[async_trait]
impl StorageNode for KuboClient {
    async fn identity(&self) -> Result<NodeIdentity> {
        let id: IdResponse = self.call("id", &[]).await?;

        Ok(NodeIdentity {
            id: id.id,
            agent_version: id.agent_version,
            protocols: id.protocols.unwrap_or_default(),
        })
    }

    async fn diagnostics(&self) -> Result<NodeDiagnostics> {
        let sys: DiagSysResponse = self.call("diag/sys", &[]).await?;

        Ok(NodeDiagnostics {
            software_version: sys.ipfs_version,
            online: sys.net.online,
        })
    }

    async fn peer_count(&self) -> Result<usize> {
        let peers: SwarmPeersResponse = self.call("swarm/peers", &[]).await?;
        Ok(peers.peers.map_or(0, |p| p.len()))
    }

    async fn repo_stats(&self) -> Result<RepoUsage> {
        let stat: RepoStatResponse = self.call("repo/stat", &[]).await?;

        Ok(RepoUsage {
            used_bytes: stat.repo_size,
            capacity_bytes: stat.storage_max,
            object_count: stat.num_objects,
        })
    }

    async fn add_stream(&self, content: ByteStream, filename: &str) -> Result<AddedEntries> {
        const COMMAND: &str = "add";

        let MultipartBody {
            content_type,
            body,
            status,
        } = MultipartBody::encode(content, filename);

        let request = self
            .request(COMMAND)
            .query(&[("wrap-with-directory", "true")])
            .header(CONTENT_TYPE, content_type)
            .body(body);

        let sent = match self.send(COMMAND, request).await {
            Ok(response) => response
                .text()
                .await
                .map_err(|e| StorageError::unreachable(COMMAND, e)),
            Err(e) => Err(e),
        };

        // A producer failure is never dropped, unless it only saw the request go away
        let (output, copied) = match (sent, MultipartBody::finish(status).await) {
            (Ok(output), Ok(copied)) => (output, copied),
            (Err(e), Err(encode)) if encode.is_receiver_gone() => return Err(e),
            (_, Err(encode)) => return Err(encode.into()),
            (Err(e), Ok(_)) => return Err(e),
        };

        let mut records = serde_json::Deserializer::from_str(&output).into_iter::<AddRecord>();
        let mut next_entry = |position: &str| -> Result<AddedEntry> {
            match records.next() {
                Some(Ok(record)) => Ok(record.into()),
                Some(Err(e)) => Err(StorageError::malformed(COMMAND, e)),
                None => Err(StorageError::malformed(
                    COMMAND,
                    format!("missing {position} record"),
                )),
            }
        };

        let file = next_entry("file")?;
        let directory = next_entry("directory")?;

        debug!(
            filename,
            copied,
            file = %file.hash,
            directory = %directory.hash,
            reported_size = ?file.size,
            "Content added"
        );

        Ok(AddedEntries { file, directory })
    }

    async fn pin_add(&self, reference: &str) -> Result<()> {
        self.call_discarding("pin/add", &[("arg", reference)]).await
    }

    async fn pin_remove(&self, reference: &str) -> Result<()> {
        match self.call_discarding("pin/rm", &[("arg", reference)]).await {
            Err(StorageError::NodeUnreachable { message, .. })
                if message.contains(NOT_PINNED_MESSAGE) =>
            {
                warn!(reference, "Unpin requested for content that is not pinned");
                Ok(())
            }
            other => other,
        }
    }

    async fn list_links(&self, reference: &str) -> Result<Vec<Link>> {
        let ls: LsResponse = self.call("ls", &[("arg", reference)]).await?;
        let mut objects = ls.objects.unwrap_or_default();

        if objects.len() != 1 {
            return Err(StorageError::MalformedLinks {
                reference: reference.to_string(),
                detail: format!("expected exactly one object, found {}", objects.len()),
            });
        }

        let links = objects
            .remove(0)
            .links
            .unwrap_or_default()
            .into_iter()
            .map(|link| Link {
                name: link.name,
                hash: link.hash,
                size: link.size,
            })
            .collect();

        Ok(links)
    }
}
