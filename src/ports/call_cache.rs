//! CallCache port - Interface for the active-call store.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::domain::{Call, CallId, PipelineError};

/// Counters for the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Live (non-expired) entries.
    pub entries: usize,
    /// Entries dropped by TTL expiration since startup.
    pub expired_total: u64,
}

/// Port for the authoritative store of currently-active calls.
///
/// Implementations must keep two views consistent at all times: the keyed
/// entries and a timestamp-ordered recency index. A reader must never
/// observe an index entry without its value or vice versa, so `put` and
/// `remove` are atomic upserts/deletes across both.
///
/// Every entry expires after `ttl` even without an explicit `remove`; the
/// poller's diff is the primary removal mechanism and expiration is the
/// backstop that bounds staleness if the poller stops running.
#[async_trait]
pub trait CallCache: Send + Sync {
    /// Upserts the call and refreshes its index position to now.
    async fn put(&self, call: Call, ttl: Duration) -> Result<(), PipelineError>;

    /// Returns the call if present and not expired.
    async fn get(&self, call_id: &CallId) -> Result<Option<Call>, PipelineError>;

    /// Deletes the value and its index entry together.
    ///
    /// Returns whether an entry was removed.
    async fn remove(&self, call_id: &CallId) -> Result<bool, PipelineError>;

    /// Returns up to `limit` calls ordered newest-first by index score.
    async fn list_recent(&self, limit: usize) -> Result<Vec<Call>, PipelineError>;

    /// Returns the ids of all live entries (used by the poller's diff).
    async fn active_ids(&self) -> Result<Vec<CallId>, PipelineError>;

    /// Returns counters for introspection.
    async fn stats(&self) -> Result<CacheStats, PipelineError>;

    /// Releases the underlying connection, if any. Called last during
    /// shutdown.
    async fn close(&self);
}
