//! Online sessions and cursors per diagram.

use crate::config::{CURSOR_FRESH_SECS, CURSOR_HASH_TTL_SECS, SESSION_STALE_SECS};
use boardsync_core::{wall_clock_ms, DiagramId, Viewport};
use boardsync_persistence::keys::{cursors_key, online_key};
use boardsync_persistence::{CacheStore, StoreResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// One live bidirectional connection; a user with two tabs has two client ids.
pub type ClientId = String;

/// Identity asserted by a session via `authenticate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub user_id: String,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_picture: Option<String>,
}

/// Record of one session connected to a diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub user_id: String,
    pub client_id: ClientId,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_picture: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub joined_at: u64,
    pub last_active: u64,
}

impl SessionRecord {
    fn is_stale(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_active) > SESSION_STALE_SECS * 1000
    }
}

/// Cursor position reported by a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorRecord {
    pub user_id: String,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
    pub last_updated: u64,
}

impl CursorRecord {
    fn is_fresh(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_updated) < CURSOR_FRESH_SECS * 1000
    }
}

/// Presence store: online sessions and cursors, keyed by client id.
pub struct PresenceStore {
    cache: Arc<dyn CacheStore>,
}

impl PresenceStore {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    /// Upserts the session record and returns the current session list.
    pub async fn join(
        &self,
        diagram: &DiagramId,
        client_id: &str,
        identity: &UserIdentity,
    ) -> StoreResult<Vec<SessionRecord>> {
        let now = wall_clock_ms();
        let record = SessionRecord {
            user_id: identity.user_id.clone(),
            client_id: client_id.to_string(),
            user_name: identity.user_name.clone(),
            user_picture: identity.user_picture.clone(),
            joined_at: now,
            last_active: now,
        };
        self.cache
            .hset(
                &online_key(diagram),
                client_id,
                serde_json::to_string(&record)?,
            )
            .await?;
        self.sessions(diagram).await
    }

    /// Removes the session and its cursor, returning the remaining sessions.
    pub async fn leave(
        &self,
        diagram: &DiagramId,
        client_id: &str,
    ) -> StoreResult<Vec<SessionRecord>> {
        self.cache.hdel(&online_key(diagram), client_id).await?;
        self.cache.hdel(&cursors_key(diagram), client_id).await?;
        self.sessions(diagram).await
    }

    /// Current session list; stale sessions are dropped while reading.
    pub async fn sessions(&self, diagram: &DiagramId) -> StoreResult<Vec<SessionRecord>> {
        let key = online_key(diagram);
        let now = wall_clock_ms();
        let mut live = Vec::new();
        for (client_id, raw) in self.cache.hgetall(&key).await? {
            match serde_json::from_str::<SessionRecord>(&raw) {
                Ok(record) if !record.is_stale(now) => live.push(record),
                Ok(_) => {
                    self.cache.hdel(&key, &client_id).await?;
                }
                Err(err) => {
                    warn!(diagram = %diagram, client = %client_id, %err, "dropping unreadable session record");
                    self.cache.hdel(&key, &client_id).await?;
                }
            }
        }
        live.sort_by_key(|record| record.joined_at);
        Ok(live)
    }

    /// Upserts the cursor, refreshes the cursor-hash TTL, and bumps the
    /// owning session's `last_active`.
    pub async fn update_cursor(
        &self,
        diagram: &DiagramId,
        user_id: &str,
        client_id: &str,
        x: f64,
        y: f64,
        viewport: Option<Viewport>,
    ) -> StoreResult<CursorRecord> {
        let record = CursorRecord {
            user_id: user_id.to_string(),
            x,
            y,
            viewport,
            last_updated: wall_clock_ms(),
        };
        let key = cursors_key(diagram);
        self.cache
            .hset(&key, client_id, serde_json::to_string(&record)?)
            .await?;
        self.cache
            .expire(&key, Duration::from_secs(CURSOR_HASH_TTL_SECS))
            .await?;
        self.touch_session(diagram, client_id).await?;
        Ok(record)
    }

    /// Live cursors, keyed by client id.
    pub async fn cursors(
        &self,
        diagram: &DiagramId,
    ) -> StoreResult<Vec<(ClientId, CursorRecord)>> {
        let now = wall_clock_ms();
        let mut live = Vec::new();
        for (client_id, raw) in self.cache.hgetall(&cursors_key(diagram)).await? {
            if let Ok(record) = serde_json::from_str::<CursorRecord>(&raw) {
                if record.is_fresh(now) {
                    live.push((client_id, record));
                }
            }
        }
        live.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(live)
    }

    /// Removes every session and cursor belonging to `user_id` (member
    /// removed from the diagram).
    pub async fn clear_user(&self, diagram: &DiagramId, user_id: &str) -> StoreResult<()> {
        let online = online_key(diagram);
        for (client_id, raw) in self.cache.hgetall(&online).await? {
            if let Ok(record) = serde_json::from_str::<SessionRecord>(&raw) {
                if record.user_id == user_id {
                    self.cache.hdel(&online, &client_id).await?;
                }
            }
        }
        let cursors = cursors_key(diagram);
        for (client_id, raw) in self.cache.hgetall(&cursors).await? {
            if let Ok(record) = serde_json::from_str::<CursorRecord>(&raw) {
                if record.user_id == user_id {
                    self.cache.hdel(&cursors, &client_id).await?;
                }
            }
        }
        Ok(())
    }

    /// Wipes every `project:{d}:*` key via a pattern scan (diagram deletion).
    pub async fn clear_all(&self, diagram: &DiagramId) -> StoreResult<()> {
        let pattern = boardsync_persistence::keys::project_pattern(diagram);
        for key in self.cache.scan(&pattern).await? {
            self.cache.del(&key).await?;
        }
        Ok(())
    }

    async fn touch_session(&self, diagram: &DiagramId, client_id: &str) -> StoreResult<()> {
        let key = online_key(diagram);
        if let Some(raw) = self.cache.hget(&key, client_id).await? {
            if let Ok(mut record) = serde_json::from_str::<SessionRecord>(&raw) {
                record.last_active = wall_clock_ms();
                self.cache
                    .hset(&key, client_id, serde_json::to_string(&record)?)
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boardsync_persistence::MemoryCacheStore;

    fn identity(user: &str) -> UserIdentity {
        UserIdentity {
            user_id: user.to_string(),
            user_name: format!("{user}-name"),
            user_picture: None,
        }
    }

    fn store() -> (PresenceStore, Arc<MemoryCacheStore>) {
        let cache = Arc::new(MemoryCacheStore::new());
        (PresenceStore::new(cache.clone()), cache)
    }

    #[tokio::test]
    async fn join_returns_all_sessions_and_two_tabs_are_two_presences() {
        let (presence, _) = store();
        let d = DiagramId::new("d1");

        let sessions = presence.join(&d, "c1", &identity("u1")).await.unwrap();
        assert_eq!(sessions.len(), 1);

        let sessions = presence.join(&d, "c2", &identity("u1")).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(sessions.iter().all(|s| s.user_id == "u1"));
    }

    #[tokio::test]
    async fn leave_removes_session_and_cursor() {
        let (presence, cache) = store();
        let d = DiagramId::new("d1");
        presence.join(&d, "c1", &identity("u1")).await.unwrap();
        presence
            .update_cursor(&d, "u1", "c1", 4.0, 2.0, None)
            .await
            .unwrap();

        let remaining = presence.leave(&d, "c1").await.unwrap();
        assert!(remaining.is_empty());
        assert!(cache
            .hget(&cursors_key(&d), "c1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn stale_sessions_are_dropped_on_read() {
        let (presence, cache) = store();
        let d = DiagramId::new("d1");
        presence.join(&d, "c1", &identity("u1")).await.unwrap();

        // Rewrite the record as if the session went idle 31 s ago.
        let raw = cache.hget(&online_key(&d), "c1").await.unwrap().unwrap();
        let mut record: SessionRecord = serde_json::from_str(&raw).unwrap();
        record.last_active = wall_clock_ms() - 31_000;
        cache
            .hset(
                &online_key(&d),
                "c1",
                serde_json::to_string(&record).unwrap(),
            )
            .await
            .unwrap();

        assert!(presence.sessions(&d).await.unwrap().is_empty());
        // Self-cleaning: the field is gone, not just filtered.
        assert!(cache.hget(&online_key(&d), "c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cursors_filter_by_freshness() {
        let (presence, cache) = store();
        let d = DiagramId::new("d1");
        presence.join(&d, "c1", &identity("u1")).await.unwrap();
        presence
            .update_cursor(&d, "u1", "c1", 1.0, 1.0, None)
            .await
            .unwrap();

        assert_eq!(presence.cursors(&d).await.unwrap().len(), 1);

        let raw = cache.hget(&cursors_key(&d), "c1").await.unwrap().unwrap();
        let mut record: CursorRecord = serde_json::from_str(&raw).unwrap();
        record.last_updated = wall_clock_ms() - 16_000;
        cache
            .hset(
                &cursors_key(&d),
                "c1",
                serde_json::to_string(&record).unwrap(),
            )
            .await
            .unwrap();

        assert!(presence.cursors(&d).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cursor_update_bumps_session_activity() {
        let (presence, cache) = store();
        let d = DiagramId::new("d1");
        presence.join(&d, "c1", &identity("u1")).await.unwrap();

        let raw = cache.hget(&online_key(&d), "c1").await.unwrap().unwrap();
        let mut record: SessionRecord = serde_json::from_str(&raw).unwrap();
        record.last_active = wall_clock_ms() - 29_000;
        cache
            .hset(
                &online_key(&d),
                "c1",
                serde_json::to_string(&record).unwrap(),
            )
            .await
            .unwrap();

        presence
            .update_cursor(&d, "u1", "c1", 0.0, 0.0, None)
            .await
            .unwrap();

        let raw = cache.hget(&online_key(&d), "c1").await.unwrap().unwrap();
        let record: SessionRecord = serde_json::from_str(&raw).unwrap();
        assert!(wall_clock_ms().saturating_sub(record.last_active) < 1_000);
    }

    #[tokio::test]
    async fn clear_user_drops_every_tab() {
        let (presence, _) = store();
        let d = DiagramId::new("d1");
        presence.join(&d, "c1", &identity("u1")).await.unwrap();
        presence.join(&d, "c2", &identity("u1")).await.unwrap();
        presence.join(&d, "c3", &identity("u2")).await.unwrap();

        presence.clear_user(&d, "u1").await.unwrap();
        let sessions = presence.sessions(&d).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].user_id, "u2");
    }
}
