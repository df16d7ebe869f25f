//! Cache store contract and the in-memory reference backend.

use crate::error::StoreResult;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Redis-shaped keyed hash store with TTL support.
///
/// Every method mirrors the store primitive the engine needs; a networked
/// backend maps them one-to-one onto `HSET`/`HGET`/`EXPIRE`/`SCAN` commands.
/// Backends must treat expired keys as absent.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Sets one field of the hash at `key`, creating the hash if absent.
    async fn hset(&self, key: &str, field: &str, value: String) -> StoreResult<()>;

    /// Reads one field of the hash at `key`.
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// Deletes one field; returns whether the field existed.
    async fn hdel(&self, key: &str, field: &str) -> StoreResult<bool>;

    /// Reads every field of the hash at `key` (empty map when absent).
    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    /// Sets a TTL on a whole key; returns whether the key existed.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Sets a plain string value with a TTL.
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()>;

    /// Reads a plain string value.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Deletes a whole key; returns whether it existed.
    async fn del(&self, key: &str) -> StoreResult<bool>;

    /// Returns every live key matching a glob pattern (`*` wildcards).
    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>>;
}

#[derive(Debug, Clone)]
enum CacheValue {
    Hash(HashMap<String, String>),
    Plain(String),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CacheValue,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-process [`CacheStore`] backed by a concurrent map.
///
/// TTLs are enforced lazily: expired entries are dropped when the key is next
/// touched (or seen by `scan`), which matches how the engine consumes the
/// contract and keeps the store free of background reaper tasks.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the entry when expired, returning whether a live entry remains.
    fn prune(&self, key: &str) -> bool {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(key);
                return false;
            }
            return true;
        }
        false
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn hset(&self, key: &str, field: &str, value: String) -> StoreResult<()> {
        self.prune(key);
        let mut entry = self.entries.entry(key.to_string()).or_insert(CacheEntry {
            value: CacheValue::Hash(HashMap::new()),
            expires_at: None,
        });
        match &mut entry.value {
            CacheValue::Hash(fields) => {
                fields.insert(field.to_string(), value);
            }
            CacheValue::Plain(_) => {
                entry.value = CacheValue::Hash(HashMap::from([(field.to_string(), value)]));
            }
        }
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        if !self.prune(key) {
            return Ok(None);
        }
        Ok(self.entries.get(key).and_then(|entry| match &entry.value {
            CacheValue::Hash(fields) => fields.get(field).cloned(),
            CacheValue::Plain(_) => None,
        }))
    }

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<bool> {
        if !self.prune(key) {
            return Ok(false);
        }
        let Some(mut entry) = self.entries.get_mut(key) else {
            return Ok(false);
        };
        match &mut entry.value {
            CacheValue::Hash(fields) => Ok(fields.remove(field).is_some()),
            CacheValue::Plain(_) => Ok(false),
        }
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        if !self.prune(key) {
            return Ok(HashMap::new());
        }
        Ok(self
            .entries
            .get(key)
            .map(|entry| match &entry.value {
                CacheValue::Hash(fields) => fields.clone(),
                CacheValue::Plain(_) => HashMap::new(),
            })
            .unwrap_or_default())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        if !self.prune(key) {
            return Ok(false);
        }
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
            return Ok(true);
        }
        Ok(false)
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()> {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: CacheValue::Plain(value),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        if !self.prune(key) {
            return Ok(None);
        }
        Ok(self.entries.get(key).and_then(|entry| match &entry.value {
            CacheValue::Plain(value) => Some(value.clone()),
            CacheValue::Hash(_) => None,
        }))
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        let existed = self.prune(key);
        self.entries.remove(key);
        Ok(existed)
    }

    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut expired = Vec::new();
        let mut matched = Vec::new();
        for entry in self.entries.iter() {
            if entry.value().is_expired() {
                expired.push(entry.key().clone());
            } else if glob_match(pattern, entry.key()) {
                matched.push(entry.key().clone());
            }
        }
        for key in expired {
            self.entries.remove(&key);
        }
        matched.sort();
        Ok(matched)
    }
}

/// Minimal glob matcher supporting `*` wildcards, enough for the
/// `project:{id}:*` scan patterns the engine issues.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == candidate;
    }

    let mut rest = candidate;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(stripped) => rest = stripped,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(at) => rest = &rest[at + part.len()..],
                None => return false,
            }
        }
    }
    // Pattern ended with '*', anything left in the candidate matches it.
    true
}
