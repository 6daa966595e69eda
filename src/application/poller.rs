//! Poll-cycle service: periodically snapshots the CAD API, diffs it
//! against the active-call cache, and publishes the resulting events.
//!
//! Exactly one cycle runs at a time. A tick that lands while a cycle is
//! still running is skipped and logged, never queued; the guard is a
//! single compare-exchange on an atomic flag.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::domain::{CallEvent, CallId, EventSource, PipelineError, Timestamp};
use crate::ports::{CadClient, CallCache, EventSink};

/// Where the poller currently is in its cycle loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    /// No cycle has run yet.
    Idle,
    /// A cycle is in flight.
    Polling,
    /// Between cycles, waiting for the next tick.
    Cooldown,
}

const STATE_IDLE: u8 = 0;
const STATE_POLLING: u8 = 1;
const STATE_COOLDOWN: u8 = 2;

/// What one completed cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub snapshot_size: usize,
    pub new: usize,
    pub updated: usize,
    pub completed: usize,
}

/// Outcome of the most recent cycle, kept for the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum LastCycle {
    Succeeded {
        finished_at: Timestamp,
        report: CycleReport,
    },
    Failed {
        finished_at: Timestamp,
        error: String,
    },
}

/// Snapshot of poller state for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PollerStats {
    pub state: CycleState,
    pub interval_secs: u64,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub cycles_skipped: u64,
    pub last_cycle: Option<LastCycle>,
}

/// Shared introspection handle, readable while the poller task runs.
pub struct PollerStatus {
    in_progress: AtomicBool,
    state: AtomicU8,
    cycles_completed: AtomicU64,
    cycles_failed: AtomicU64,
    cycles_skipped: AtomicU64,
    last_cycle: Mutex<Option<LastCycle>>,
}

impl PollerStatus {
    fn new() -> Self {
        Self {
            in_progress: AtomicBool::new(false),
            state: AtomicU8::new(STATE_IDLE),
            cycles_completed: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
            cycles_skipped: AtomicU64::new(0),
            last_cycle: Mutex::new(None),
        }
    }

    pub fn state(&self) -> CycleState {
        match self.state.load(Ordering::SeqCst) {
            STATE_POLLING => CycleState::Polling,
            STATE_COOLDOWN => CycleState::Cooldown,
            _ => CycleState::Idle,
        }
    }

    fn set_state(&self, state: CycleState) {
        let raw = match state {
            CycleState::Idle => STATE_IDLE,
            CycleState::Polling => STATE_POLLING,
            CycleState::Cooldown => STATE_COOLDOWN,
        };
        self.state.store(raw, Ordering::SeqCst);
    }

    fn record(&self, outcome: LastCycle) {
        *self
            .last_cycle
            .lock()
            .expect("PollerStatus: last_cycle lock poisoned") = Some(outcome);
    }
}

/// The call-sync poller.
pub struct Poller {
    cad: Arc<dyn CadClient>,
    cache: Arc<dyn CallCache>,
    sink: Arc<dyn EventSink>,
    poll_interval: Duration,
    call_ttl: Duration,
    status: Arc<PollerStatus>,
}

impl Poller {
    pub fn new(
        cad: Arc<dyn CadClient>,
        cache: Arc<dyn CallCache>,
        sink: Arc<dyn EventSink>,
        poll_interval: Duration,
        call_ttl: Duration,
    ) -> Self {
        Self {
            cad,
            cache,
            sink,
            poll_interval,
            call_ttl,
            status: Arc::new(PollerStatus::new()),
        }
    }

    /// Shared status handle for the status endpoint.
    pub fn status(&self) -> Arc<PollerStatus> {
        Arc::clone(&self.status)
    }

    pub fn stats(&self) -> PollerStats {
        let status = &self.status;
        PollerStats {
            state: status.state(),
            interval_secs: self.poll_interval.as_secs(),
            cycles_completed: status.cycles_completed.load(Ordering::SeqCst),
            cycles_failed: status.cycles_failed.load(Ordering::SeqCst),
            cycles_skipped: status.cycles_skipped.load(Ordering::SeqCst),
            last_cycle: status
                .last_cycle
                .lock()
                .expect("PollerStatus: last_cycle lock poisoned")
                .clone(),
        }
    }

    /// One guarded tick: runs a cycle unless one is already in flight.
    pub async fn tick(&self) {
        if self
            .status
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.status.cycles_skipped.fetch_add(1, Ordering::SeqCst);
            tracing::warn!("poll tick landed during a running cycle, skipping");
            return;
        }

        self.status.set_state(CycleState::Polling);
        let started = std::time::Instant::now();

        match self.run_cycle().await {
            Ok(report) => {
                self.status.cycles_completed.fetch_add(1, Ordering::SeqCst);
                self.status.record(LastCycle::Succeeded {
                    finished_at: Timestamp::now(),
                    report,
                });
                tracing::info!(
                    snapshot = report.snapshot_size,
                    new = report.new,
                    updated = report.updated,
                    completed = report.completed,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "poll cycle finished"
                );
            }
            Err(error) => {
                self.status.cycles_failed.fetch_add(1, Ordering::SeqCst);
                self.status.record(LastCycle::Failed {
                    finished_at: Timestamp::now(),
                    error: error.to_string(),
                });
                tracing::error!(%error, "poll cycle failed");
            }
        }

        self.status.set_state(CycleState::Cooldown);
        self.status.in_progress.store(false, Ordering::SeqCst);
    }

    /// Fetches a full snapshot and reconciles the cache against it.
    ///
    /// Classification is derived from cache membership, so a replayed
    /// cycle over the same snapshot is idempotent. Completions are
    /// classified only after every new/update has been applied; a call
    /// moving between queues mid-cycle can therefore never be marked
    /// complete in the same cycle it appeared.
    ///
    /// For each event the relay publish is attempted first, then the
    /// cache mutation is applied whether or not the relay accepted it:
    /// the cache must track upstream reality even when the relay is down.
    pub async fn run_cycle(&self) -> Result<CycleReport, PipelineError> {
        // A fetch failure aborts the whole cycle before any mutation.
        let snapshot = self.cad.fetch_active_calls().await?;

        let known: HashSet<CallId> = self.cache.active_ids().await?.into_iter().collect();

        let mut report = CycleReport {
            snapshot_size: snapshot.len(),
            new: 0,
            updated: 0,
            completed: 0,
        };
        let mut seen: HashSet<CallId> = HashSet::with_capacity(snapshot.len());

        for call in snapshot {
            let call = call.observed_now();
            seen.insert(call.id.clone());

            let event = if known.contains(&call.id) {
                report.updated += 1;
                CallEvent::updated(call.clone(), EventSource::Poll)
            } else {
                report.new += 1;
                CallEvent::created(call.clone(), EventSource::Poll)
            };

            self.publish(event).await?;
            self.cache.put(call, self.call_ttl).await?;
        }

        for call_id in known {
            if seen.contains(&call_id) {
                continue;
            }
            // Gone from the snapshot: the call was closed upstream.
            if let Some(call) = self.cache.get(&call_id).await? {
                report.completed += 1;
                self.publish(CallEvent::completed(call, EventSource::Poll))
                    .await?;
            }
            self.cache.remove(&call_id).await?;
        }

        Ok(report)
    }

    async fn publish(&self, event: CallEvent) -> Result<(), PipelineError> {
        let accepted = self.sink.publish(event.clone()).await?;
        if !accepted {
            tracing::warn!(
                event_id = %event.id,
                call_id = %event.call_id,
                routing_key = %event.kind,
                "relay rejected publish, event lost for this cycle"
            );
        }
        Ok(())
    }

    /// Spawns the timed poll loop. The first cycle runs immediately;
    /// the task exits when the shutdown channel flips to `true`.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(interval_secs = self.poll_interval.as_secs(), "poller started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("poller stopped");
        })
    }
}
