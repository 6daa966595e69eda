//! In-process event broker with RabbitMQ-style delivery semantics.
//!
//! One topic exchange routed by `EventKind`, three event queues plus a
//! bounded dead-letter queue. Delivery is at-least-once: a message stays
//! in flight until the consumer settles it, and an unsettled delivery
//! that gets dropped (consumer crash, task abort) is requeued with an
//! incremented attempt count.
//!
//! # Settlement
//!
//! - `ack`    - processing succeeded, discard the message
//! - `nack`   - transient failure, redeliver (dead-letter once the
//!   attempt budget is spent)
//! - `reject` - poison message, dead-letter immediately
//!
//! Consumer-side prefetch is bounded by a semaphore whose permits are
//! held for the life of each delivery, so a slow downstream cannot pull
//! unbounded messages into memory.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

use crate::domain::{CallEvent, EventKind, PipelineError, Timestamp};

/// Broker connection states.
const STATE_CONNECTED: u8 = 0;
const STATE_DISCONNECTED: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Tuning knobs for the broker.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Maximum in-flight (delivered but unsettled) messages.
    pub prefetch: usize,
    /// Delivery attempts before a nacked message is dead-lettered.
    pub max_attempts: u32,
    /// Dead-letter queue capacity; oldest entries are dropped beyond it.
    pub dead_letter_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            prefetch: 10,
            max_attempts: 3,
            dead_letter_capacity: 256,
        }
    }
}

/// Reconnection schedule: exponential backoff, capped delay, bounded
/// attempt count.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given attempt (1-based): base * 2^(attempt-1),
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        let delay = self
            .base_delay
            .saturating_mul(2_u32.saturating_pow(shift).max(1));
        delay.min(self.max_delay)
    }
}

/// A message parked in the dead-letter queue for manual inspection.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub event: CallEvent,
    pub attempts: u32,
    pub reason: String,
    pub dead_lettered_at: Timestamp,
}

/// Snapshot of broker state for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RelayStats {
    pub connected: bool,
    pub new_depth: usize,
    pub update_depth: usize,
    pub complete_depth: usize,
    pub in_flight: usize,
    pub dead_letters: usize,
    pub published_total: u64,
    pub consumed_total: u64,
    pub dead_lettered_total: u64,
}

struct QueuedMessage {
    event: CallEvent,
    /// 1-based delivery attempt this message will be on next.
    attempt: u32,
}

struct Inner {
    queues: [VecDeque<QueuedMessage>; 3],
    dead_letters: VecDeque<DeadLetter>,
    /// Round-robin cursor so no queue starves the others.
    cursor: usize,
    in_flight: usize,
    published_total: u64,
    consumed_total: u64,
    dead_lettered_total: u64,
}

fn queue_slot(kind: EventKind) -> usize {
    match kind {
        EventKind::New => 0,
        EventKind::Update => 1,
        EventKind::Complete => 2,
    }
}

/// The in-process event relay broker.
///
/// Shared as `Arc<EventBroker>`; publish and consume paths are safe to
/// use concurrently. The inner lock is a plain mutex held only for queue
/// manipulation, never across an await.
pub struct EventBroker {
    inner: Mutex<Inner>,
    notify: Notify,
    /// Woken on connect/disconnect/close, watched by the supervisor.
    state_changed: Notify,
    prefetch: Arc<Semaphore>,
    state: AtomicU8,
    config: BrokerConfig,
}

impl EventBroker {
    /// Creates a connected broker with the given configuration.
    pub fn new(config: BrokerConfig) -> Arc<Self> {
        Arc::new(Self {
            prefetch: Arc::new(Semaphore::new(config.prefetch)),
            inner: Mutex::new(Inner {
                queues: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
                dead_letters: VecDeque::new(),
                cursor: 0,
                in_flight: 0,
                published_total: 0,
                consumed_total: 0,
                dead_lettered_total: 0,
            }),
            notify: Notify::new(),
            state_changed: Notify::new(),
            state: AtomicU8::new(STATE_CONNECTED),
            config,
        })
    }

    /// Creates a connected broker with default configuration.
    pub fn with_defaults() -> Arc<Self> {
        Self::new(BrokerConfig::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("EventBroker: inner lock poisoned")
    }

    /// Whether publishes are currently accepted.
    pub fn is_connected(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_CONNECTED
    }

    /// Whether the broker has been shut down for good.
    pub fn is_closed(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_CLOSED
    }

    /// Publishes an event onto the queue matching its kind.
    ///
    /// Fails fast with `false` while disconnected or closed; never
    /// blocks on broker state.
    pub fn publish(&self, event: CallEvent) -> bool {
        if !self.is_connected() {
            tracing::warn!(
                event_id = %event.id,
                call_id = %event.call_id,
                routing_key = %event.kind,
                "relay disconnected, dropping publish"
            );
            return false;
        }

        let mut inner = self.lock();
        inner.published_total += 1;
        inner.queues[queue_slot(event.kind)].push_back(QueuedMessage { event, attempt: 1 });
        drop(inner);

        self.notify.notify_one();
        true
    }

    /// Awaits the next delivery, honoring the prefetch bound.
    ///
    /// Returns `None` once the broker is closed and its queues will no
    /// longer be served.
    pub async fn next_delivery(self: &Arc<Self>) -> Option<Delivery> {
        let permit = match self.prefetch.clone().acquire_owned().await {
            Ok(permit) => permit,
            // Semaphore closed on shutdown.
            Err(_) => return None,
        };

        loop {
            if self.is_closed() {
                return None;
            }

            {
                let mut inner = self.lock();
                if let Some(msg) = pop_round_robin(&mut inner) {
                    inner.in_flight += 1;
                    return Some(Delivery {
                        event: msg.event,
                        attempt: msg.attempt,
                        broker: Arc::clone(self),
                        _permit: permit,
                        settled: false,
                    });
                }
            }

            self.notify.notified().await;
        }
    }

    /// Simulates/handles loss of the broker transport: publishes fail
    /// fast until `reconnect` succeeds. Delivery of already-queued
    /// messages continues.
    pub fn disconnect(&self) {
        let _ = self.state.compare_exchange(
            STATE_CONNECTED,
            STATE_DISCONNECTED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        tracing::warn!("relay transport disconnected");
        self.state_changed.notify_waiters();
    }

    /// Attempts a single reconnect. Fails if the broker is closed.
    pub fn reconnect(&self) -> bool {
        self.state
            .compare_exchange(
                STATE_DISCONNECTED,
                STATE_CONNECTED,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
            || self.is_connected()
    }

    /// Reconnects under the given policy: exponential backoff with a
    /// capped delay and a bounded attempt count.
    ///
    /// Returns `false` if the attempt budget is exhausted or the broker
    /// was closed meanwhile.
    pub async fn reconnect_with_backoff(&self, policy: &ReconnectPolicy) -> bool {
        for attempt in 1..=policy.max_attempts {
            if self.is_closed() {
                return false;
            }
            if self.reconnect() {
                tracing::info!(attempt, "relay transport reconnected");
                return true;
            }
            let delay = policy.delay_for(attempt);
            tracing::warn!(attempt, ?delay, "relay reconnect failed, backing off");
            tokio::time::sleep(delay).await;
        }
        tracing::error!(
            max_attempts = policy.max_attempts,
            "relay reconnect attempts exhausted"
        );
        false
    }

    /// Shuts the broker down: publishers fail fast, consumers drain out,
    /// unsettled deliveries return to their queues and stay there.
    pub fn close(&self) {
        self.state.store(STATE_CLOSED, Ordering::SeqCst);
        self.prefetch.close();
        self.notify.notify_waiters();
        self.state_changed.notify_waiters();
    }

    /// Spawns the connectivity supervisor: whenever the transport drops,
    /// it runs the reconnect policy until connectivity returns or the
    /// attempt budget is spent. The task exits on `close`.
    pub fn spawn_supervisor(self: Arc<Self>, policy: ReconnectPolicy) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if self.is_closed() {
                    break;
                }

                // Register interest before re-checking state, so a
                // disconnect between the check and the await is not lost.
                let changed = self.state_changed.notified();
                tokio::pin!(changed);
                changed.as_mut().enable();

                if self.is_connected() {
                    changed.await;
                    continue;
                }

                if !self.reconnect_with_backoff(&policy).await {
                    break;
                }
            }
            tracing::debug!("relay supervisor stopped");
        })
    }

    /// Returns the dead-lettered messages for manual inspection.
    ///
    /// Dead letters are never replayed automatically.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.lock().dead_letters.iter().cloned().collect()
    }

    /// Snapshot of queue depths and counters.
    pub fn stats(&self) -> RelayStats {
        let inner = self.lock();
        RelayStats {
            connected: self.is_connected(),
            new_depth: inner.queues[0].len(),
            update_depth: inner.queues[1].len(),
            complete_depth: inner.queues[2].len(),
            in_flight: inner.in_flight,
            dead_letters: inner.dead_letters.len(),
            published_total: inner.published_total,
            consumed_total: inner.consumed_total,
            dead_lettered_total: inner.dead_lettered_total,
        }
    }

    fn settle_ack(&self, _event: &CallEvent) {
        let mut inner = self.lock();
        inner.in_flight -= 1;
        inner.consumed_total += 1;
    }

    fn settle_nack(&self, event: CallEvent, attempt: u32) {
        let next_attempt = attempt + 1;
        let mut inner = self.lock();
        inner.in_flight -= 1;

        if next_attempt > self.config.max_attempts {
            push_dead_letter(
                &mut inner,
                self.config.dead_letter_capacity,
                event,
                attempt,
                "retry attempts exhausted",
            );
        } else {
            inner.queues[queue_slot(event.kind)].push_back(QueuedMessage {
                event,
                attempt: next_attempt,
            });
            drop(inner);
            self.notify.notify_one();
        }
    }

    fn settle_reject(&self, event: CallEvent, attempt: u32, reason: &str) {
        let mut inner = self.lock();
        inner.in_flight -= 1;
        push_dead_letter(
            &mut inner,
            self.config.dead_letter_capacity,
            event,
            attempt,
            reason,
        );
    }

    /// Requeue path for deliveries dropped without settlement.
    fn requeue_unsettled(&self, event: CallEvent, attempt: u32) {
        tracing::warn!(
            event_id = %event.id,
            attempt,
            "delivery dropped without settlement, requeueing"
        );
        let mut inner = self.lock();
        inner.in_flight -= 1;
        inner.queues[queue_slot(event.kind)].push_front(QueuedMessage {
            event,
            attempt: attempt + 1,
        });
        drop(inner);
        self.notify.notify_one();
    }
}

#[async_trait::async_trait]
impl crate::ports::EventSink for EventBroker {
    async fn publish(&self, event: CallEvent) -> Result<bool, PipelineError> {
        Ok(EventBroker::publish(self, event))
    }
}

fn pop_round_robin(inner: &mut Inner) -> Option<QueuedMessage> {
    for offset in 0..3 {
        let slot = (inner.cursor + offset) % 3;
        if let Some(msg) = inner.queues[slot].pop_front() {
            inner.cursor = (slot + 1) % 3;
            return Some(msg);
        }
    }
    None
}

fn push_dead_letter(
    inner: &mut Inner,
    capacity: usize,
    event: CallEvent,
    attempts: u32,
    reason: &str,
) {
    tracing::error!(
        event_id = %event.id,
        call_id = %event.call_id,
        routing_key = %event.kind,
        attempts,
        reason,
        "message dead-lettered"
    );

    if inner.dead_letters.len() == capacity {
        inner.dead_letters.pop_front();
    }
    inner.dead_letters.push_back(DeadLetter {
        event,
        attempts,
        reason: reason.to_string(),
        dead_lettered_at: Timestamp::now(),
    });
    inner.dead_lettered_total += 1;
}

/// One in-flight message. Holds a prefetch permit until settled or
/// dropped.
pub struct Delivery {
    event: CallEvent,
    attempt: u32,
    broker: Arc<EventBroker>,
    _permit: OwnedSemaphorePermit,
    settled: bool,
}

impl Delivery {
    /// The delivered event.
    pub fn event(&self) -> &CallEvent {
        &self.event
    }

    /// 1-based delivery attempt.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Acknowledges successful processing; the message is discarded.
    pub fn ack(mut self) {
        self.settled = true;
        self.broker.settle_ack(&self.event);
    }

    /// Signals a transient failure; the message is redelivered, or
    /// dead-lettered once the attempt budget is spent.
    pub fn nack(mut self) {
        self.settled = true;
        let event = self.event.clone();
        self.broker.settle_nack(event, self.attempt);
    }

    /// Signals a poison message; dead-lettered immediately, never
    /// redelivered.
    pub fn reject(mut self, reason: &str) {
        self.settled = true;
        let event = self.event.clone();
        self.broker.settle_reject(event, self.attempt, reason);
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if !self.settled {
            self.broker
                .requeue_unsettled(self.event.clone(), self.attempt);
        }
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("event_id", &self.event.id)
            .field("attempt", &self.attempt)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Call, EventSource};
    use std::time::Duration;

    fn test_event(id: &str, kind: EventKind) -> CallEvent {
        CallEvent::new(kind, Call::test_fixture(id), EventSource::Poll)
    }

    #[tokio::test]
    async fn publish_then_consume_delivers_event() {
        let broker = EventBroker::with_defaults();

        assert!(broker.publish(test_event("cad-1", EventKind::New)));

        let delivery = broker.next_delivery().await.unwrap();
        assert_eq!(delivery.event().call_id.as_str(), "cad-1");
        assert_eq!(delivery.attempt(), 1);
        delivery.ack();

        let stats = broker.stats();
        assert_eq!(stats.consumed_total, 1);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn publish_routes_by_kind() {
        let broker = EventBroker::with_defaults();
        broker.publish(test_event("a", EventKind::New));
        broker.publish(test_event("b", EventKind::Update));
        broker.publish(test_event("c", EventKind::Complete));

        let stats = broker.stats();
        assert_eq!(stats.new_depth, 1);
        assert_eq!(stats.update_depth, 1);
        assert_eq!(stats.complete_depth, 1);
    }

    #[tokio::test]
    async fn nack_redelivers_with_incremented_attempt() {
        let broker = EventBroker::with_defaults();
        broker.publish(test_event("cad-1", EventKind::Update));

        let first = broker.next_delivery().await.unwrap();
        assert_eq!(first.attempt(), 1);
        first.nack();

        let second = broker.next_delivery().await.unwrap();
        assert_eq!(second.attempt(), 2);
        assert_eq!(second.event().call_id.as_str(), "cad-1");
        second.ack();
    }

    #[tokio::test]
    async fn nack_exhaustion_dead_letters_exactly_once() {
        let broker = EventBroker::new(BrokerConfig {
            max_attempts: 3,
            ..BrokerConfig::default()
        });
        broker.publish(test_event("cad-1", EventKind::New));

        for _ in 0..3 {
            let delivery = broker.next_delivery().await.unwrap();
            delivery.nack();
        }

        let dead = broker.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].event.call_id.as_str(), "cad-1");
        assert_eq!(dead[0].attempts, 3);

        // Origin queue is empty: no redelivery after dead-lettering.
        let stats = broker.stats();
        assert_eq!(stats.new_depth, 0);
        assert_eq!(stats.dead_lettered_total, 1);
    }

    #[tokio::test]
    async fn reject_dead_letters_immediately() {
        let broker = EventBroker::with_defaults();
        broker.publish(test_event("cad-1", EventKind::New));

        let delivery = broker.next_delivery().await.unwrap();
        delivery.reject("unparseable payload");

        let dead = broker.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].reason, "unparseable payload");
        assert_eq!(broker.stats().new_depth, 0);
    }

    #[tokio::test]
    async fn dropped_delivery_is_redelivered() {
        let broker = EventBroker::with_defaults();
        broker.publish(test_event("cad-1", EventKind::New));

        {
            // Simulates a consumer crash between receive and ack.
            let _delivery = broker.next_delivery().await.unwrap();
        }

        let redelivered = broker.next_delivery().await.unwrap();
        assert_eq!(redelivered.event().call_id.as_str(), "cad-1");
        assert_eq!(redelivered.attempt(), 2);
        redelivered.ack();
    }

    #[tokio::test]
    async fn prefetch_bounds_in_flight_deliveries() {
        let broker = EventBroker::new(BrokerConfig {
            prefetch: 2,
            ..BrokerConfig::default()
        });
        for i in 0..3 {
            broker.publish(test_event(&format!("cad-{i}"), EventKind::New));
        }

        let d1 = broker.next_delivery().await.unwrap();
        let _d2 = broker.next_delivery().await.unwrap();

        // Third delivery must wait for a permit.
        let waited =
            tokio::time::timeout(Duration::from_millis(50), broker.next_delivery()).await;
        assert!(waited.is_err());

        d1.ack();
        let d3 = tokio::time::timeout(Duration::from_millis(200), broker.next_delivery())
            .await
            .expect("permit freed by ack")
            .unwrap();
        d3.ack();
    }

    #[tokio::test]
    async fn publish_fails_fast_while_disconnected() {
        let broker = EventBroker::with_defaults();
        broker.disconnect();

        assert!(!broker.publish(test_event("cad-1", EventKind::New)));
        assert!(!broker.stats().connected);

        assert!(broker.reconnect());
        assert!(broker.publish(test_event("cad-1", EventKind::New)));
    }

    #[tokio::test]
    async fn reconnect_with_backoff_succeeds_when_transport_returns() {
        let broker = EventBroker::with_defaults();
        broker.disconnect();

        let ok = broker
            .reconnect_with_backoff(&ReconnectPolicy::default())
            .await;
        assert!(ok);
        assert!(broker.is_connected());
    }

    #[tokio::test]
    async fn supervisor_restores_connectivity_after_transport_loss() {
        let broker = EventBroker::with_defaults();
        let supervisor = Arc::clone(&broker).spawn_supervisor(ReconnectPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            max_attempts: 5,
        });

        broker.disconnect();
        assert!(!broker.publish(test_event("cad-1", EventKind::New)));

        tokio::time::timeout(Duration::from_secs(1), async {
            while !broker.is_connected() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("supervisor should reconnect the transport");

        assert!(broker.publish(test_event("cad-1", EventKind::New)));

        broker.close();
        tokio::time::timeout(Duration::from_secs(1), supervisor)
            .await
            .expect("supervisor should exit on close")
            .unwrap();
    }

    #[tokio::test]
    async fn supervisor_exits_when_broker_closes_while_connected() {
        let broker = EventBroker::with_defaults();
        let supervisor = Arc::clone(&broker).spawn_supervisor(ReconnectPolicy::default());

        tokio::time::sleep(Duration::from_millis(10)).await;
        broker.close();

        tokio::time::timeout(Duration::from_secs(1), supervisor)
            .await
            .expect("supervisor should exit on close")
            .unwrap();
    }

    #[tokio::test]
    async fn close_stops_consumers_and_publishers() {
        let broker = EventBroker::with_defaults();
        broker.close();

        assert!(!broker.publish(test_event("cad-1", EventKind::New)));
        assert!(broker.next_delivery().await.is_none());
    }

    #[tokio::test]
    async fn close_wakes_blocked_consumer() {
        let broker = EventBroker::with_defaults();
        let waiter = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move { broker.next_delivery().await.is_none() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.close();

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn dead_letter_queue_is_bounded() {
        let broker = EventBroker::new(BrokerConfig {
            dead_letter_capacity: 2,
            ..BrokerConfig::default()
        });

        for i in 0..4 {
            broker.publish(test_event(&format!("cad-{i}"), EventKind::New));
            let delivery = broker.next_delivery().await.unwrap();
            delivery.reject("poison");
        }

        let dead = broker.dead_letters();
        assert_eq!(dead.len(), 2);
        // Oldest entries were dropped.
        assert_eq!(dead[0].event.call_id.as_str(), "cad-2");
        assert_eq!(dead[1].event.call_id.as_str(), "cad-3");
        assert_eq!(broker.stats().dead_lettered_total, 4);
    }

    #[test]
    fn backoff_schedule_doubles_and_caps() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_attempts: 8,
        };

        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for(5), Duration::from_secs(10));
        assert_eq!(policy.delay_for(8), Duration::from_secs(10));
    }
}
