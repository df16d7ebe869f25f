//! Hot snapshot cache (read/write-through state store).

use boardsync_core::{wall_clock_ms, DiagramId, Snapshot};
use boardsync_persistence::keys::{state_fields, state_key};
use boardsync_persistence::{CacheStore, StoreResult};
use std::sync::Arc;
use tracing::debug;

/// Hot cache of each diagram's current snapshot.
///
/// The snapshot is stored as a hash with one field per sequence so that
/// operational tooling can inspect individual parts without decoding the
/// whole document. The pipeline worker is the only writer for a given
/// diagram; the join path only reads.
pub struct StateStore {
    cache: Arc<dyn CacheStore>,
}

impl StateStore {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    /// Reads the hot snapshot, or `None` on a cache miss.
    pub async fn get(&self, diagram: &DiagramId) -> StoreResult<Option<Snapshot>> {
        let fields = self.cache.hgetall(&state_key(diagram)).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        let mut snapshot = Snapshot::empty();
        if let Some(raw) = fields.get(state_fields::ENTITIES) {
            snapshot.entities = serde_json::from_str(raw)?;
        }
        if let Some(raw) = fields.get(state_fields::RELATIONSHIPS) {
            snapshot.relationships = serde_json::from_str(raw)?;
        }
        if let Some(raw) = fields.get(state_fields::SCREENS) {
            snapshot.screens = serde_json::from_str(raw)?;
        }
        if let Some(raw) = fields.get(state_fields::FLOWS) {
            snapshot.flows = serde_json::from_str(raw)?;
        }
        if let Some(raw) = fields.get(state_fields::VERSION) {
            snapshot.version = raw.parse().unwrap_or(0);
        }
        Ok(Some(snapshot))
    }

    /// Writes the hot snapshot.
    pub async fn put(&self, diagram: &DiagramId, snapshot: &Snapshot) -> StoreResult<()> {
        let key = state_key(diagram);
        self.cache
            .hset(
                &key,
                state_fields::ENTITIES,
                serde_json::to_string(&snapshot.entities)?,
            )
            .await?;
        self.cache
            .hset(
                &key,
                state_fields::RELATIONSHIPS,
                serde_json::to_string(&snapshot.relationships)?,
            )
            .await?;
        self.cache
            .hset(
                &key,
                state_fields::SCREENS,
                serde_json::to_string(&snapshot.screens)?,
            )
            .await?;
        self.cache
            .hset(
                &key,
                state_fields::FLOWS,
                serde_json::to_string(&snapshot.flows)?,
            )
            .await?;
        self.cache
            .hset(&key, state_fields::VERSION, snapshot.version.to_string())
            .await?;
        self.cache
            .hset(
                &key,
                state_fields::LAST_UPDATED_AT,
                wall_clock_ms().to_string(),
            )
            .await?;
        Ok(())
    }

    /// Seeds the cache from durable storage; no-op when hot state exists.
    pub async fn init_from_durable(
        &self,
        diagram: &DiagramId,
        snapshot: &Snapshot,
    ) -> StoreResult<()> {
        if self.get(diagram).await?.is_some() {
            return Ok(());
        }
        debug!(diagram = %diagram, version = snapshot.version, "seeding hot state");
        self.put(diagram, snapshot).await
    }

    /// Drops the hot snapshot (room eviction / diagram deletion).
    pub async fn remove(&self, diagram: &DiagramId) -> StoreResult<()> {
        self.cache.del(&state_key(diagram)).await?;
        Ok(())
    }
}
