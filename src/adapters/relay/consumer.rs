//! Relay consumer: drains the broker and applies events to the cache
//! and the dashboard fan-out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use super::broker::{Delivery, EventBroker};
use crate::adapters::websocket::{BroadcastHub, ServerMessage};
use crate::domain::{CallEvent, EventKind, PipelineError};
use crate::ports::{CallCache, EventHandler};

/// Applies delivered events to the active-call cache and broadcasts the
/// matching dashboard frame.
///
/// Handling is idempotent: re-applying a `new` event to an already
/// cached call degrades to an update (last write wins), and removing an
/// already-removed call is a no-op. Poll-produced and webhook-produced
/// events are indistinguishable here.
pub struct DashboardEventHandler {
    cache: Arc<dyn CallCache>,
    hub: Arc<BroadcastHub>,
    call_ttl: Duration,
}

impl DashboardEventHandler {
    pub fn new(cache: Arc<dyn CallCache>, hub: Arc<BroadcastHub>, call_ttl: Duration) -> Self {
        Self {
            cache,
            hub,
            call_ttl,
        }
    }
}

#[async_trait]
impl EventHandler for DashboardEventHandler {
    async fn handle(&self, event: CallEvent) -> Result<(), PipelineError> {
        match event.kind {
            EventKind::New | EventKind::Update => {
                self.cache.put(event.call.clone(), self.call_ttl).await?;
            }
            EventKind::Complete => {
                self.cache.remove(&event.call_id).await?;
            }
        }

        let delivered = self.hub.broadcast(ServerMessage::from_event(&event)).await;
        tracing::debug!(
            event_id = %event.id,
            call_id = %event.call_id,
            routing_key = %event.kind,
            clients = delivered,
            "event applied and broadcast"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "dashboard"
    }
}

/// Background task pulling deliveries off the broker and settling them
/// according to the handler outcome.
pub struct RelayConsumer {
    broker: Arc<EventBroker>,
    handler: Arc<dyn EventHandler>,
}

impl RelayConsumer {
    pub fn new(broker: Arc<EventBroker>, handler: Arc<dyn EventHandler>) -> Self {
        Self { broker, handler }
    }

    /// Spawns the consumer loop. The task completes once the broker is
    /// closed and drained.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(handler = self.handler.name(), "relay consumer started");
            while let Some(delivery) = self.broker.next_delivery().await {
                Self::dispatch(self.handler.as_ref(), delivery).await;
            }
            tracing::info!(handler = self.handler.name(), "relay consumer stopped");
        })
    }

    async fn dispatch(handler: &dyn EventHandler, delivery: Delivery) {
        let event = delivery.event().clone();
        match handler.handle(event).await {
            Ok(()) => delivery.ack(),
            Err(error) if error.is_transient() => {
                tracing::warn!(
                    handler = handler.name(),
                    event_id = %delivery.event().id,
                    attempt = delivery.attempt(),
                    %error,
                    "transient handler failure, requeueing"
                );
                delivery.nack();
            }
            Err(error) => {
                tracing::error!(
                    handler = handler.name(),
                    event_id = %delivery.event().id,
                    %error,
                    "permanent handler failure, dead-lettering"
                );
                delivery.reject(&error.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::cache::InMemoryCallCache;
    use crate::adapters::relay::BrokerConfig;
    use crate::domain::{Call, EventSource};
    use std::sync::atomic::{AtomicU32, Ordering};

    const TTL: Duration = Duration::from_secs(3600);

    fn pipeline() -> (Arc<EventBroker>, Arc<InMemoryCallCache>, Arc<BroadcastHub>) {
        let broker = EventBroker::with_defaults();
        let cache = Arc::new(InMemoryCallCache::new());
        let hub = Arc::new(BroadcastHub::new());
        (broker, cache, hub)
    }

    #[tokio::test]
    async fn new_event_populates_cache_and_broadcasts() {
        let (broker, cache, hub) = pipeline();
        let (_client, mut rx) = hub.register().await;
        let handler = Arc::new(DashboardEventHandler::new(cache.clone(), hub.clone(), TTL));
        let consumer = RelayConsumer::new(broker.clone(), handler).spawn();

        let call = Call::test_fixture("cad-1");
        broker.publish(CallEvent::created(call.clone(), EventSource::Poll));

        let frame = rx.recv().await.unwrap();
        assert!(matches!(frame, ServerMessage::NewCall { .. }));
        assert_eq!(cache.get(&call.id).await.unwrap(), Some(call));

        broker.close();
        consumer.await.unwrap();
    }

    #[tokio::test]
    async fn complete_event_evicts_and_broadcasts_closure() {
        let (broker, cache, hub) = pipeline();
        let call = Call::test_fixture("cad-1");
        cache.put(call.clone(), TTL).await.unwrap();

        let (_client, mut rx) = hub.register().await;
        let handler = Arc::new(DashboardEventHandler::new(cache.clone(), hub.clone(), TTL));
        let consumer = RelayConsumer::new(broker.clone(), handler).spawn();

        broker.publish(CallEvent::completed(call.clone(), EventSource::Webhook));

        let frame = rx.recv().await.unwrap();
        match frame {
            ServerMessage::CallClosed { data, .. } => assert_eq!(data.call_id, call.id),
            other => panic!("expected call_closed, got {other:?}"),
        }
        assert_eq!(cache.get(&call.id).await.unwrap(), None);

        broker.close();
        consumer.await.unwrap();
    }

    #[tokio::test]
    async fn replayed_new_event_degrades_to_update() {
        let (broker, cache, hub) = pipeline();
        let handler = DashboardEventHandler::new(cache.clone(), hub, TTL);

        let mut call = Call::test_fixture("cad-1");
        handler
            .handle(CallEvent::created(call.clone(), EventSource::Poll))
            .await
            .unwrap();

        call.description = "Second delivery".to_string();
        handler
            .handle(CallEvent::created(call.clone(), EventSource::Poll))
            .await
            .unwrap();

        let cached = cache.get(&call.id).await.unwrap().unwrap();
        assert_eq!(cached.description, "Second delivery");
        assert_eq!(cache.list_recent(10).await.unwrap().len(), 1);
        drop(broker);
    }

    struct FlakyHandler {
        calls: AtomicU32,
        fail_times: u32,
    }

    #[async_trait]
    impl EventHandler for FlakyHandler {
        async fn handle(&self, _event: CallEvent) -> Result<(), PipelineError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(PipelineError::cache("transient store failure"))
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn transient_failure_is_retried_until_success() {
        let broker = EventBroker::with_defaults();
        let handler = Arc::new(FlakyHandler {
            calls: AtomicU32::new(0),
            fail_times: 2,
        });
        let consumer = RelayConsumer::new(broker.clone(), handler.clone()).spawn();

        broker.publish(CallEvent::created(
            Call::test_fixture("cad-1"),
            EventSource::Poll,
        ));

        // Third attempt succeeds; nothing dead-letters.
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if broker.stats().consumed_total == 1 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("event should be consumed after retries");

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert!(broker.dead_letters().is_empty());

        broker.close();
        consumer.await.unwrap();
    }

    struct PoisonHandler;

    #[async_trait]
    impl EventHandler for PoisonHandler {
        async fn handle(&self, _event: CallEvent) -> Result<(), PipelineError> {
            Err(PipelineError::new(
                crate::domain::ErrorCode::InvalidPayload,
                "unprocessable event",
            ))
        }

        fn name(&self) -> &'static str {
            "poison"
        }
    }

    #[tokio::test]
    async fn permanent_failure_dead_letters_without_retry() {
        let broker = EventBroker::new(BrokerConfig::default());
        let consumer = RelayConsumer::new(broker.clone(), Arc::new(PoisonHandler)).spawn();

        broker.publish(CallEvent::created(
            Call::test_fixture("cad-1"),
            EventSource::Poll,
        ));

        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if broker.stats().dead_letters == 1 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("poison event should dead-letter");

        let dead = broker.dead_letters();
        assert_eq!(dead[0].attempts, 1);

        broker.close();
        consumer.await.unwrap();
    }
}
