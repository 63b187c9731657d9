//! In-memory storage node for tests and local development

use super::{
    AddedEntries, AddedEntry, ByteStream, Link, NodeDiagnostics, NodeIdentity, RepoUsage, Result,
    StorageError, StorageNode,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct State {
    /// Object hash -> links
    objects: HashMap<String, Vec<Link>>,
    pins: HashSet<String>,
    failing: HashSet<&'static str>,
    calls: Vec<String>,
    next_id: u64,
}

/// Storage node double that keeps objects and pins in memory
///
/// Status queries (`id`, `diag/sys`, `swarm/peers`, `repo/stat`) are not
/// recorded in [`InMemoryNode::calls`]; content operations are.
#[derive(Debug, Default)]
pub struct InMemoryNode {
    state: Mutex<State>,
    peers: usize,
}

impl InMemoryNode {
    pub fn new() -> Self {
        Self {
            peers: 8,
            ..Self::default()
        }
    }

    /// Make a wrapping directory available as if fetched from peers
    pub fn make_reachable(&self, directory: &str, file: &str, size: u64) {
        let mut state = self.lock();
        state.objects.insert(
            directory.to_string(),
            vec![Link {
                name: file.to_string(),
                hash: file.to_string(),
                size,
            }],
        );
        state.objects.insert(
            file.to_string(),
            vec![Link {
                name: String::new(),
                hash: format!("{file}-block"),
                size,
            }],
        );
    }

    /// Fail every subsequent call to `command` (e.g. `"id"`, `"pin/add"`)
    pub fn fail(&self, command: &'static str) {
        self.lock().failing.insert(command);
    }

    pub fn is_pinned(&self, reference: &str) -> bool {
        self.lock().pins.contains(reference)
    }

    /// Content operations performed so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self, command: &'static str) -> Result<()> {
        if self.lock().failing.contains(command) {
            return Err(StorageError::unreachable(command, "injected failure"));
        }
        Ok(())
    }

    fn record(&self, call: String) {
        self.lock().calls.push(call);
    }
}

#[async_trait]
impl StorageNode for InMemoryNode {
    async fn identity(&self) -> Result<NodeIdentity> {
        self.check("id")?;
        Ok(NodeIdentity {
            id: "12D3KooWInMemory".to_string(),
            agent_version: "kubo/0.0.0-memory/".to_string(),
            protocols: Vec::new(),
        })
    }

    async fn diagnostics(&self) -> Result<NodeDiagnostics> {
        self.check("diag/sys")?;
        Ok(NodeDiagnostics {
            software_version: "0.0.0-memory".to_string(),
            online: true,
        })
    }

    async fn peer_count(&self) -> Result<usize> {
        self.check("swarm/peers")?;
        Ok(self.peers)
    }

    async fn repo_stats(&self) -> Result<RepoUsage> {
        self.check("repo/stat")?;
        let state = self.lock();
        let used_bytes = state
            .objects
            .values()
            .flatten()
            .filter(|link| link.name.is_empty())
            .map(|link| link.size)
            .sum();

        Ok(RepoUsage {
            used_bytes,
            capacity_bytes: 10 * 1024 * 1024 * 1024,
            object_count: state.objects.len() as u64,
        })
    }

    async fn add_stream(&self, mut content: ByteStream, filename: &str) -> Result<AddedEntries> {
        self.record(format!("add {filename}"));
        self.check("add")?;

        let mut size = 0u64;
        while let Some(chunk) = content.next().await {
            let chunk = chunk.map_err(|e| StorageError::unreachable("add", e))?;
            size += chunk.len() as u64;
        }

        let id = {
            let mut state = self.lock();
            state.next_id += 1;
            state.next_id
        };
        let file = format!("QmFile{id}");
        let directory = format!("QmDir{id}");
        self.make_reachable(&directory, &file, size);
        self.lock().pins.insert(directory.clone());

        Ok(AddedEntries {
            file: AddedEntry {
                name: filename.to_string(),
                hash: file,
                size: Some(size),
            },
            directory: AddedEntry {
                name: String::new(),
                hash: directory,
                size: None,
            },
        })
    }

    async fn pin_add(&self, reference: &str) -> Result<()> {
        self.record(format!("pin_add {reference}"));
        self.check("pin/add")?;

        let mut state = self.lock();
        if !state.objects.contains_key(reference) {
            return Err(StorageError::unreachable(
                "pin/add",
                format!("could not find {reference} among peers"),
            ));
        }
        state.pins.insert(reference.to_string());
        Ok(())
    }

    async fn pin_remove(&self, reference: &str) -> Result<()> {
        self.record(format!("pin_remove {reference}"));
        self.check("pin/rm")?;
        self.lock().pins.remove(reference);
        Ok(())
    }

    async fn list_links(&self, reference: &str) -> Result<Vec<Link>> {
        self.record(format!("ls {reference}"));
        self.check("ls")?;

        self.lock()
            .objects
            .get(reference)
            .cloned()
            .ok_or_else(|| StorageError::MalformedLinks {
                reference: reference.to_string(),
                detail: "expected exactly one object, found 0".to_string(),
            })
    }
}
