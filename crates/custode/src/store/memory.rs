//! In-memory store for tests and local development.
//!
//! A sorted map with lazy TTL expiry. Listing is deterministic (key order)
//! and the cursor is the last key of the previous page, which stays valid
//! across interleaved deletes, the property grant revocation relies on.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;

use super::{DEFAULT_LIST_LIMIT, KvPage, KvStore};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-process [`KvStore`] backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries. Test helper.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read();
        Ok(entries
            .get(key)
            .filter(|e| !e.is_expired(Instant::now()))
            .map(|e| e.value.clone()))
    }

    async fn put(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl_secs.map(|secs| Instant::now() + Duration::from_secs(secs)),
        };
        self.entries.write().insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn list(
        &self,
        prefix: &str,
        limit: Option<usize>,
        cursor: Option<&str>,
    ) -> Result<KvPage> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).max(1);
        let now = Instant::now();

        let start = match cursor {
            Some(c) => Bound::Excluded(c.to_string()),
            None => Bound::Included(prefix.to_string()),
        };

        let entries = self.entries.read();
        let mut keys = Vec::new();
        let mut complete = true;
        for (key, entry) in entries.range::<String, _>((start, Bound::Unbounded)) {
            if !key.starts_with(prefix) {
                break;
            }
            if entry.is_expired(now) {
                continue;
            }
            if keys.len() == limit {
                complete = false;
                break;
            }
            keys.push(key.clone());
        }

        let cursor = if complete { None } else { keys.last().cloned() };
        Ok(KvPage {
            keys,
            cursor,
            complete,
        })
    }
}
