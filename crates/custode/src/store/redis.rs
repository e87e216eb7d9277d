//! Redis-backed store.
//!
//! Values are written with `SET … EX` so Redis owns TTL enforcement, and
//! prefix listing maps onto `SCAN … MATCH prefix* COUNT n`. The scan
//! cursor is Redis's own cursor rendered as a string; `COUNT` is a hint,
//! so pages may run short or long, and a key can reappear across pages
//! while the keyspace rebalances. Both are tolerated by the callers:
//! listings re-read records per key and revocation deletes idempotently.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::{DEFAULT_LIST_LIMIT, KvPage, KvStore};

/// Redis [`KvStore`] backend.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis at `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("failed to create Redis client")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("failed to connect to Redis")?;
        Ok(Self { conn })
    }
}

/// Escape glob metacharacters so a literal prefix cannot act as a pattern.
fn escape_match_pattern(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.context("failed to read key")
    }

    async fn put(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()> {
        let mut conn = self.conn.clone();
        match ttl_secs {
            Some(ttl) => {
                let _: () = conn
                    .set_ex(key, value, ttl)
                    .await
                    .context("failed to write key with TTL")?;
            }
            None => {
                let _: () = conn.set(key, value).await.context("failed to write key")?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await.context("failed to delete key")?;
        Ok(())
    }

    async fn list(
        &self,
        prefix: &str,
        limit: Option<usize>,
        cursor: Option<&str>,
    ) -> Result<KvPage> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).max(1);
        let mut conn = self.conn.clone();

        let cursor: u64 = cursor
            .unwrap_or("0")
            .parse()
            .context("malformed list cursor")?;
        let pattern = format!("{}*", escape_match_pattern(prefix));

        let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(&pattern)
            .arg("COUNT")
            .arg(limit)
            .query_async(&mut conn)
            .await
            .context("failed to scan keys")?;

        let complete = next == 0;
        Ok(KvPage {
            keys,
            cursor: (!complete).then(|| next.to_string()),
            complete,
        })
    }
}
