//! Redis-backed active-call cache.
//!
//! Layout: one JSON string per call under `dispatch:call:{id}` with a
//! Redis-native TTL, plus a sorted-set recency index
//! `dispatch:calls:recent` scored by observation time in unix millis.
//! Value and index are written in one `MULTI` pipe so neither is visible
//! without the other.
//!
//! TTL expiry happens inside Redis, which cannot touch the index; index
//! members whose value has expired are pruned when reads discover them.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::domain::{Call, CallId, PipelineError, Timestamp};
use crate::ports::{CacheStats, CallCache};

const CALL_KEY_PREFIX: &str = "dispatch:call:";
const RECENT_INDEX_KEY: &str = "dispatch:calls:recent";

fn call_key(id: &CallId) -> String {
    format!("{CALL_KEY_PREFIX}{}", id.as_str())
}

/// Inclusive ZRANGE stop index for a result cap. Clamped so limits above
/// `isize::MAX` do not wrap when cast.
fn zrange_stop(limit: usize) -> isize {
    limit.saturating_sub(1).min(isize::MAX as usize) as isize
}

fn cache_err(operation: &str, err: redis::RedisError) -> PipelineError {
    PipelineError::cache(err.to_string()).with_detail("operation", operation)
}

/// Redis implementation of the `CallCache` port.
///
/// `ConnectionManager` multiplexes and reconnects internally; it is
/// cloned per operation since port methods take `&self`.
pub struct RedisCallCache {
    conn: ConnectionManager,
    expired_total: AtomicU64,
}

impl RedisCallCache {
    /// Connects to Redis at the given URL.
    pub async fn connect(url: &str) -> Result<Self, PipelineError> {
        let client = redis::Client::open(url)
            .map_err(|e| cache_err("connect", e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| cache_err("connect", e))?;
        Ok(Self {
            conn,
            expired_total: AtomicU64::new(0),
        })
    }

    /// Fetches the values for the given index members, pruning members
    /// whose value has expired. Returns surviving calls in member order.
    async fn fetch_and_prune(
        &self,
        conn: &mut ConnectionManager,
        ids: Vec<String>,
    ) -> Result<Vec<Call>, PipelineError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids
            .iter()
            .map(|id| call_key(&CallId::new(id.as_str())))
            .collect();
        let values: Vec<Option<String>> = conn
            .mget(&keys)
            .await
            .map_err(|e| cache_err("mget", e))?;

        let mut calls = Vec::with_capacity(ids.len());
        let mut stale: Vec<&String> = Vec::new();

        for (id, value) in ids.iter().zip(values) {
            match value {
                Some(json) => calls.push(serde_json::from_str::<Call>(&json)?),
                None => stale.push(id),
            }
        }

        if !stale.is_empty() {
            let _: usize = conn
                .zrem(RECENT_INDEX_KEY, &stale)
                .await
                .map_err(|e| cache_err("zrem", e))?;
            self.expired_total
                .fetch_add(stale.len() as u64, Ordering::Relaxed);
        }

        Ok(calls)
    }
}

#[async_trait]
impl CallCache for RedisCallCache {
    async fn put(&self, call: Call, ttl: Duration) -> Result<(), PipelineError> {
        let json = serde_json::to_string(&call)?;
        let score = Timestamp::now().as_unix_millis();
        let ttl_secs = ttl.as_secs().max(1);
        let mut conn = self.conn.clone();

        redis::pipe()
            .atomic()
            .set_ex(call_key(&call.id), json, ttl_secs)
            .ignore()
            .zadd(RECENT_INDEX_KEY, call.id.as_str(), score)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| cache_err("put", e))?;

        Ok(())
    }

    async fn get(&self, call_id: &CallId) -> Result<Option<Call>, PipelineError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn
            .get(call_key(call_id))
            .await
            .map_err(|e| cache_err("get", e))?;

        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, call_id: &CallId) -> Result<bool, PipelineError> {
        let mut conn = self.conn.clone();
        let (deleted, _removed): (u64, u64) = redis::pipe()
            .atomic()
            .del(call_key(call_id))
            .zrem(RECENT_INDEX_KEY, call_id.as_str())
            .query_async(&mut conn)
            .await
            .map_err(|e| cache_err("remove", e))?;

        Ok(deleted > 0)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Call>, PipelineError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .zrevrange(RECENT_INDEX_KEY, 0, zrange_stop(limit))
            .await
            .map_err(|e| cache_err("zrevrange", e))?;

        self.fetch_and_prune(&mut conn, ids).await
    }

    async fn active_ids(&self) -> Result<Vec<CallId>, PipelineError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .zrange(RECENT_INDEX_KEY, 0, -1)
            .await
            .map_err(|e| cache_err("zrange", e))?;

        let calls = self.fetch_and_prune(&mut conn, ids).await?;
        Ok(calls.into_iter().map(|c| c.id).collect())
    }

    async fn stats(&self) -> Result<CacheStats, PipelineError> {
        Ok(CacheStats {
            entries: self.active_ids().await?.len(),
            expired_total: self.expired_total.load(Ordering::Relaxed),
        })
    }

    async fn close(&self) {
        // ConnectionManager closes on drop.
    }
}
