//! Key-value storage.
//!
//! The provider persists everything through [`KvStore`]: an eventually
//! consistent store with per-key TTLs and prefix listing behind an opaque
//! cursor. Staleness is tolerated by design; TTLs double as garbage
//! collection for expired codes and tokens.

pub mod memory;
pub mod redis;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Default page size for prefix listings when the caller does not pass one.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// One page of a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct KvPage {
    /// Matching key names (not values).
    pub keys: Vec<String>,
    /// Opaque cursor for the next page; `None` once `complete`.
    pub cursor: Option<String>,
    /// True when no further pages remain.
    pub complete: bool,
}

/// Storage contract consumed by every service in the crate.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch the raw value at `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write `value` at `key`, optionally expiring after `ttl_secs`.
    async fn put(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()>;

    /// Delete `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List key names under `prefix`. Pass the previous page's cursor to
    /// continue; a page with `complete == true` ends the scan.
    async fn list(
        &self,
        prefix: &str,
        limit: Option<usize>,
        cursor: Option<&str>,
    ) -> Result<KvPage>;
}

/// Read and deserialize a JSON record.
pub async fn get_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(raw) => {
            let value = serde_json::from_str(&raw)
                .with_context(|| format!("malformed record at {key}"))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Serialize and write a JSON record.
pub async fn put_json<T: Serialize>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
    ttl_secs: Option<u64>,
) -> Result<()> {
    let raw = serde_json::to_string(value).context("failed to serialize record")?;
    store.put(key, &raw, ttl_secs).await
}

// ── Key naming ──────────────────────────────────────────────────────────
//
// All entities are partitioned by prefix: `client:`, `grant:`, `token:`.
// Token keys embed the token hash so API validation is a single read.

pub const CLIENT_PREFIX: &str = "client:";

pub fn client_key(client_id: &str) -> String {
    format!("client:{client_id}")
}

pub fn grant_key(user_id: &str, grant_id: &str) -> String {
    format!("grant:{user_id}:{grant_id}")
}

pub fn grant_prefix(user_id: &str) -> String {
    format!("grant:{user_id}:")
}

pub fn token_key(user_id: &str, grant_id: &str, token_hash: &str) -> String {
    format!("token:{user_id}:{grant_id}:{token_hash}")
}

pub fn token_prefix(user_id: &str, grant_id: &str) -> String {
    format!("token:{user_id}:{grant_id}:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_naming() {
        assert_eq!(client_key("abc"), "client:abc");
        assert_eq!(grant_key("u1", "g1"), "grant:u1:g1");
        assert_eq!(grant_prefix("u1"), "grant:u1:");
        assert_eq!(token_key("u1", "g1", "hash"), "token:u1:g1:hash");
        assert_eq!(token_prefix("u1", "g1"), "token:u1:g1:");
    }
}
