//! Scripted CAD client for tests and local development.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::domain::{Call, PipelineError};
use crate::ports::CadClient;

/// `CadClient` whose responses are scripted in advance.
///
/// Each `fetch_active_calls` pops the next scripted response. Once the
/// script runs out, the last successful snapshot is repeated, so a test
/// can settle into a steady state without padding its script.
pub struct MockCadClient {
    script: Mutex<VecDeque<Result<Vec<Call>, PipelineError>>>,
    last_snapshot: Mutex<Vec<Call>>,
    fetch_count: AtomicU32,
}

impl MockCadClient {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            last_snapshot: Mutex::new(Vec::new()),
            fetch_count: AtomicU32::new(0),
        }
    }

    /// Queues a snapshot to return on a future fetch.
    pub fn enqueue_snapshot(&self, calls: Vec<Call>) {
        self.script
            .lock()
            .expect("MockCadClient: script lock poisoned")
            .push_back(Ok(calls));
    }

    /// Queues a failure to return on a future fetch.
    pub fn enqueue_failure(&self, error: PipelineError) {
        self.script
            .lock()
            .expect("MockCadClient: script lock poisoned")
            .push_back(Err(error));
    }

    /// Number of fetches performed so far.
    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

impl Default for MockCadClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CadClient for MockCadClient {
    async fn fetch_active_calls(&self) -> Result<Vec<Call>, PipelineError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        let next = self
            .script
            .lock()
            .expect("MockCadClient: script lock poisoned")
            .pop_front();

        match next {
            Some(Ok(calls)) => {
                *self
                    .last_snapshot
                    .lock()
                    .expect("MockCadClient: snapshot lock poisoned") = calls.clone();
                Ok(calls)
            }
            Some(Err(error)) => Err(error),
            None => Ok(self
                .last_snapshot
                .lock()
                .expect("MockCadClient: snapshot lock poisoned")
                .clone()),
        }
    }
}
