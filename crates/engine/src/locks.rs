//! Advisory per-element locks with TTL.
//!
//! Locks exist to help UIs suppress conflicting edits; the apply engine never
//! consults them. A client that ignores them can still mutate, and the
//! Lamport LWW policy decides.

use crate::config::LOCK_TTL_SECS;
use crate::presence::UserIdentity;
use boardsync_core::{wall_clock_ms, DiagramId};
use boardsync_persistence::keys::locks_key;
use boardsync_persistence::{CacheStore, StoreResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Holder record of one advisory lock, keyed by entity id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub user_id: String,
    pub user_name: String,
    /// Milliseconds since the Unix epoch.
    pub locked_at: u64,
    pub expires_at: u64,
}

impl LockRecord {
    fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }
}

/// Result of a lock acquisition attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum LockOutcome {
    /// Lock granted (fresh or renewed); the new record is returned.
    Granted(LockRecord),
    /// Somebody else holds the lock.
    Held(LockRecord),
}

/// Advisory lock manager.
pub struct LockManager {
    cache: Arc<dyn CacheStore>,
}

impl LockManager {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    /// Attempts to acquire the lock on `entity_id`.
    ///
    /// Granted when no record exists, the record expired, or the requester
    /// already holds it; the record is rewritten with a fresh expiry in all
    /// three cases.
    pub async fn acquire(
        &self,
        diagram: &DiagramId,
        entity_id: &str,
        user: &UserIdentity,
    ) -> StoreResult<LockOutcome> {
        let now = wall_clock_ms();
        if let Some(existing) = self.read(diagram, entity_id).await? {
            if !existing.is_expired(now) && existing.user_id != user.user_id {
                return Ok(LockOutcome::Held(existing));
            }
        }

        let record = LockRecord {
            user_id: user.user_id.clone(),
            user_name: user.user_name.clone(),
            locked_at: now,
            expires_at: now + LOCK_TTL_SECS * 1000,
        };
        self.write(diagram, entity_id, &record).await?;
        Ok(LockOutcome::Granted(record))
    }

    /// Releases the lock; succeeds only for the recorded holder.
    pub async fn release(
        &self,
        diagram: &DiagramId,
        entity_id: &str,
        user_id: &str,
    ) -> StoreResult<bool> {
        match self.read(diagram, entity_id).await? {
            Some(record) if record.user_id == user_id => {
                self.cache.hdel(&locks_key(diagram), entity_id).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Extends the holder's lease by the full TTL (heartbeat).
    pub async fn renew(
        &self,
        diagram: &DiagramId,
        entity_id: &str,
        user_id: &str,
    ) -> StoreResult<bool> {
        let now = wall_clock_ms();
        match self.read(diagram, entity_id).await? {
            Some(mut record) if record.user_id == user_id && !record.is_expired(now) => {
                record.expires_at = now + LOCK_TTL_SECS * 1000;
                self.write(diagram, entity_id, &record).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// All live locks; expired records are lazily reaped.
    pub async fn all(&self, diagram: &DiagramId) -> StoreResult<Vec<(String, LockRecord)>> {
        let key = locks_key(diagram);
        let now = wall_clock_ms();
        let mut live = Vec::new();
        for (entity_id, raw) in self.cache.hgetall(&key).await? {
            match serde_json::from_str::<LockRecord>(&raw) {
                Ok(record) if !record.is_expired(now) => live.push((entity_id, record)),
                _ => {
                    self.cache.hdel(&key, &entity_id).await?;
                }
            }
        }
        live.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(live)
    }

    /// Releases every lock held by `user_id`, returning the freed entity ids.
    pub async fn release_all_by_user(
        &self,
        diagram: &DiagramId,
        user_id: &str,
    ) -> StoreResult<Vec<String>> {
        let key = locks_key(diagram);
        let mut released = Vec::new();
        for (entity_id, raw) in self.cache.hgetall(&key).await? {
            if let Ok(record) = serde_json::from_str::<LockRecord>(&raw) {
                if record.user_id == user_id {
                    self.cache.hdel(&key, &entity_id).await?;
                    released.push(entity_id);
                }
            }
        }
        released.sort();
        Ok(released)
    }

    /// Wipes the lock hash (diagram deletion).
    pub async fn clear_all(&self, diagram: &DiagramId) -> StoreResult<()> {
        self.cache.del(&locks_key(diagram)).await?;
        Ok(())
    }

    async fn read(&self, diagram: &DiagramId, entity_id: &str) -> StoreResult<Option<LockRecord>> {
        Ok(self
            .cache
            .hget(&locks_key(diagram), entity_id)
            .await?
            .and_then(|raw| serde_json::from_str(&raw).ok()))
    }

    async fn write(
        &self,
        diagram: &DiagramId,
        entity_id: &str,
        record: &LockRecord,
    ) -> StoreResult<()> {
        self.cache
            .hset(
                &locks_key(diagram),
                entity_id,
                serde_json::to_string(record)?,
            )
            .await?;
        Ok(())
    }
}
