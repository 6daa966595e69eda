//! In-memory active-call cache.
//!
//! Backs tests and single-node deployments. Keyed entries and the
//! recency index live under one `RwLock`, so both views mutate together
//! and a reader can never observe one without the other.
//!
//! Expiration is lazy: expired entries are treated as absent on read and
//! physically purged on the next write-path operation. There is no
//! background sweeper.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::domain::{Call, CallId, PipelineError, Timestamp};
use crate::ports::{CacheStats, CallCache};

struct Entry {
    call: Call,
    expires_at: Timestamp,
    /// Index score at the time of the last put (unix millis).
    score: i64,
}

impl Entry {
    fn is_expired(&self, now: &Timestamp) -> bool {
        self.expires_at.is_before(now) || self.expires_at == *now
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<CallId, Entry>,
    /// Recency index: (score, id) ascending. Newest entries sort last.
    index: BTreeMap<(i64, CallId), ()>,
    expired_total: u64,
}

impl Inner {
    /// Drops every entry whose TTL has passed. Called on write paths.
    fn purge_expired(&mut self, now: &Timestamp) {
        let dead: Vec<CallId> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();

        for id in dead {
            if let Some(entry) = self.entries.remove(&id) {
                self.index.remove(&(entry.score, id));
                self.expired_total += 1;
            }
        }
    }
}

/// In-memory implementation of the `CallCache` port.
pub struct InMemoryCallCache {
    inner: RwLock<Inner>,
}

impl InMemoryCallCache {
    /// Creates a new empty cache.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for InMemoryCallCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CallCache for InMemoryCallCache {
    async fn put(&self, call: Call, ttl: Duration) -> Result<(), PipelineError> {
        let now = Timestamp::now();
        let mut inner = self.inner.write().await;
        inner.purge_expired(&now);

        let id = call.id.clone();
        let score = now.as_unix_millis();

        // Upsert: drop the previous index position before inserting the new one.
        if let Some(old) = inner.entries.remove(&id) {
            inner.index.remove(&(old.score, id.clone()));
        }

        inner.index.insert((score, id.clone()), ());
        inner.entries.insert(
            id,
            Entry {
                call,
                expires_at: now.plus_millis(ttl.as_millis() as u64),
                score,
            },
        );

        Ok(())
    }

    async fn get(&self, call_id: &CallId) -> Result<Option<Call>, PipelineError> {
        let now = Timestamp::now();
        let inner = self.inner.read().await;

        match inner.entries.get(call_id) {
            Some(entry) if !entry.is_expired(&now) => Ok(Some(entry.call.clone())),
            // Expired entries read as absent; the next write purges them.
            _ => Ok(None),
        }
    }

    async fn remove(&self, call_id: &CallId) -> Result<bool, PipelineError> {
        let now = Timestamp::now();
        let mut inner = self.inner.write().await;
        inner.purge_expired(&now);

        match inner.entries.remove(call_id) {
            Some(entry) => {
                inner.index.remove(&(entry.score, call_id.clone()));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Call>, PipelineError> {
        let now = Timestamp::now();
        let inner = self.inner.read().await;

        let mut calls = Vec::new();
        for (_, id) in inner.index.keys().rev() {
            if calls.len() == limit {
                break;
            }
            if let Some(entry) = inner.entries.get(id) {
                if !entry.is_expired(&now) {
                    calls.push(entry.call.clone());
                }
            }
        }

        Ok(calls)
    }

    async fn active_ids(&self) -> Result<Vec<CallId>, PipelineError> {
        let now = Timestamp::now();
        let inner = self.inner.read().await;

        Ok(inner
            .entries
            .iter()
            .filter(|(_, e)| !e.is_expired(&now))
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn stats(&self) -> Result<CacheStats, PipelineError> {
        let now = Timestamp::now();
        let inner = self.inner.read().await;

        Ok(CacheStats {
            entries: inner
                .entries
                .values()
                .filter(|e| !e.is_expired(&now))
                .count(),
            expired_total: inner.expired_total,
        })
    }

    async fn close(&self) {
        // Nothing to release.
    }
}
