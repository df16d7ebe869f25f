//! Document store contract and reference backends.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use boardsync_core::{DiagramId, HistoryEntry, Snapshot};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Durable form of a diagram: the snapshot plus an externally visible
/// modification stamp bumped on every save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDiagram {
    pub snapshot: Snapshot,
    pub updated_at: DateTime<Utc>,
}

/// Durable home of diagram snapshots and audit history.
///
/// The engine calls this only for durable diagram ids; transient ids never
/// reach it.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Loads the persisted snapshot, or `None` when the diagram is absent.
    async fn load_diagram(&self, id: &DiagramId) -> StoreResult<Option<Snapshot>>;

    /// Durably replaces the snapshot and bumps `updated_at`.
    async fn save_diagram(&self, id: &DiagramId, snapshot: &Snapshot) -> StoreResult<()>;

    /// Removes the diagram and its history.
    async fn delete_diagram(&self, id: &DiagramId) -> StoreResult<()>;

    /// Appends one audit entry.
    async fn append_history(&self, entry: &HistoryEntry) -> StoreResult<()>;

    /// Returns up to `limit` entries, most recent first.
    async fn recent_history(
        &self,
        id: &DiagramId,
        limit: usize,
    ) -> StoreResult<Vec<HistoryEntry>>;
}

/// In-process [`DocumentStore`] for tests and transient deployments.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    diagrams: DashMap<DiagramId, StoredDiagram>,
    history: DashMap<DiagramId, Vec<HistoryEntry>>,
    saves: AtomicU64,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Modification stamp of a stored diagram, when present.
    pub fn updated_at(&self, id: &DiagramId) -> Option<DateTime<Utc>> {
        self.diagrams.get(id).map(|d| d.updated_at)
    }

    /// Number of `save_diagram` calls observed, for flush-policy assertions.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn load_diagram(&self, id: &DiagramId) -> StoreResult<Option<Snapshot>> {
        Ok(self.diagrams.get(id).map(|d| {
            let mut snapshot = d.snapshot.clone();
            snapshot.saved_at = Some(d.updated_at);
            snapshot
        }))
    }

    async fn save_diagram(&self, id: &DiagramId, snapshot: &Snapshot) -> StoreResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.diagrams.insert(
            id.clone(),
            StoredDiagram {
                snapshot: snapshot.clone(),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete_diagram(&self, id: &DiagramId) -> StoreResult<()> {
        self.diagrams.remove(id);
        self.history.remove(id);
        Ok(())
    }

    async fn append_history(&self, entry: &HistoryEntry) -> StoreResult<()> {
        self.history
            .entry(entry.diagram_id.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn recent_history(
        &self,
        id: &DiagramId,
        limit: usize,
    ) -> StoreResult<Vec<HistoryEntry>> {
        Ok(self
            .history
            .get(id)
            .map(|entries| entries.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// File-backed [`DocumentStore`]: one JSON document per diagram plus a
/// JSON-lines history sidecar, under a data directory.
#[derive(Debug)]
pub struct FileDocumentStore {
    dir: PathBuf,
}

impl FileDocumentStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn checked_id<'a>(&self, id: &'a DiagramId) -> StoreResult<&'a str> {
        let raw = id.as_str();
        if raw.is_empty() || raw.contains(['/', '\\']) || raw.contains("..") {
            return Err(StoreError::InvalidKey {
                key: raw.to_string(),
                reason: "diagram id is not a safe file name".to_string(),
            });
        }
        Ok(raw)
    }

    fn diagram_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn history_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.history.jsonl"))
    }

    /// Reads the stored document including its modification stamp.
    pub async fn load_stored(&self, id: &DiagramId) -> StoreResult<Option<StoredDiagram>> {
        let path = self.diagram_path(self.checked_id(id)?);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(id, &path, err)),
        }
    }
}

fn io_error(id: &DiagramId, path: &Path, err: std::io::Error) -> StoreError {
    StoreError::DocumentIo {
        id: id.to_string(),
        reason: format!("{}: {err}", path.display()),
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn load_diagram(&self, id: &DiagramId) -> StoreResult<Option<Snapshot>> {
        Ok(self.load_stored(id).await?.map(|d| {
            let mut snapshot = d.snapshot;
            snapshot.saved_at = Some(d.updated_at);
            snapshot
        }))
    }

    async fn save_diagram(&self, id: &DiagramId, snapshot: &Snapshot) -> StoreResult<()> {
        let raw = self.checked_id(id)?;
        let path = self.diagram_path(raw);
        let stored = StoredDiagram {
            snapshot: snapshot.clone(),
            updated_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&stored)?;

        // Write-then-rename keeps a crash from leaving a truncated document.
        let tmp = self.dir.join(format!("{raw}.json.tmp"));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| io_error(id, &tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(id, &path, e))?;
        debug!(diagram = %id, version = snapshot.version, "diagram persisted");
        Ok(())
    }

    async fn delete_diagram(&self, id: &DiagramId) -> StoreResult<()> {
        let raw = self.checked_id(id)?;
        for path in [self.diagram_path(raw), self.history_path(raw)] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(io_error(id, &path, err)),
            }
        }
        Ok(())
    }

    async fn append_history(&self, entry: &HistoryEntry) -> StoreResult<()> {
        let raw = self.checked_id(&entry.diagram_id)?;
        let path = self.history_path(raw);
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| io_error(&entry.diagram_id, &path, e))?;
        file.write_all(&line)
            .await
            .map_err(|e| io_error(&entry.diagram_id, &path, e))?;
        Ok(())
    }

    async fn recent_history(
        &self,
        id: &DiagramId,
        limit: usize,
    ) -> StoreResult<Vec<HistoryEntry>> {
        let path = self.history_path(self.checked_id(id)?);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_error(id, &path, err)),
        };

        let mut entries: Vec<HistoryEntry> = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(line)?);
        }
        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }
}
