//! End-to-end pipeline scenarios: poll and webhook ingress through the
//! relay out to a connected dashboard channel.

use std::sync::Arc;
use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use dispatch_console::adapters::cache::InMemoryCallCache;
use dispatch_console::adapters::cad::MockCadClient;
use dispatch_console::adapters::http::{router, AppState, SIGNATURE_HEADER};
use dispatch_console::adapters::relay::{DashboardEventHandler, EventBroker, RelayConsumer};
use dispatch_console::adapters::websocket::{BroadcastHub, ServerMessage};
use dispatch_console::application::Poller;
use dispatch_console::domain::ingress::WebhookVerifier;
use dispatch_console::domain::{Call, CallId};
use dispatch_console::ports::CallCache;

const TTL: Duration = Duration::from_secs(3600);
const WEBHOOK_SECRET: &str = "whsec_integration_test";

struct Pipeline {
    mock: Arc<MockCadClient>,
    cache: Arc<InMemoryCallCache>,
    broker: Arc<EventBroker>,
    hub: Arc<BroadcastHub>,
    poller: Arc<Poller>,
    consumer: tokio::task::JoinHandle<()>,
}

fn build_pipeline() -> Pipeline {
    let mock = Arc::new(MockCadClient::new());
    let cache = Arc::new(InMemoryCallCache::new());
    let broker = EventBroker::with_defaults();
    let hub = Arc::new(BroadcastHub::new());

    let handler = Arc::new(DashboardEventHandler::new(cache.clone(), hub.clone(), TTL));
    let consumer = RelayConsumer::new(broker.clone(), handler).spawn();

    let poller = Arc::new(Poller::new(
        mock.clone(),
        cache.clone(),
        broker.clone(),
        Duration::from_secs(30),
        TTL,
    ));

    Pipeline {
        mock,
        cache,
        broker,
        hub,
        poller,
        consumer,
    }
}

impl Pipeline {
    fn app_state(&self) -> AppState {
        AppState {
            cache: self.cache.clone(),
            broker: self.broker.clone(),
            hub: self.hub.clone(),
            poller: self.poller.clone(),
            verifier: Arc::new(WebhookVerifier::new(WEBHOOK_SECRET)),
            recent_limit: 50,
            heartbeat_interval: Duration::from_secs(30),
        }
    }

    async fn shutdown(self) {
        self.broker.close();
        self.consumer.await.unwrap();
        self.hub.close_all().await;
        self.cache.close().await;
    }
}

async fn next_frame(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<ServerMessage>,
) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for dashboard frame")
        .expect("hub channel closed")
}

#[tokio::test]
async fn new_call_reaches_dashboard_and_closure_evicts_it() {
    let pipeline = build_pipeline();
    let (_client, mut rx) = pipeline.hub.register().await;

    // Cycle 1: one active call appears upstream.
    pipeline
        .mock
        .enqueue_snapshot(vec![Call::test_fixture("cad-100")]);
    pipeline.poller.run_cycle().await.unwrap();

    match next_frame(&mut rx).await {
        ServerMessage::NewCall { data, .. } => assert_eq!(data.id.as_str(), "cad-100"),
        other => panic!("expected new_call, got {other:?}"),
    }
    assert!(pipeline
        .cache
        .get(&CallId::new("cad-100"))
        .await
        .unwrap()
        .is_some());

    // Cycle 2: the call is gone from the snapshot.
    pipeline.mock.enqueue_snapshot(vec![]);
    pipeline.poller.run_cycle().await.unwrap();

    match next_frame(&mut rx).await {
        ServerMessage::CallClosed { data, .. } => assert_eq!(data.call_id.as_str(), "cad-100"),
        other => panic!("expected call_closed, got {other:?}"),
    }

    // Give the consumer a beat to settle the eviction.
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if pipeline
                .cache
                .get(&CallId::new("cad-100"))
                .await
                .unwrap()
                .is_none()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("closed call should leave the cache");

    pipeline.shutdown().await;
}

#[tokio::test]
async fn repeated_cycle_broadcasts_update_not_new() {
    let pipeline = build_pipeline();
    let (_client, mut rx) = pipeline.hub.register().await;

    pipeline
        .mock
        .enqueue_snapshot(vec![Call::test_fixture("cad-200")]);
    pipeline.poller.run_cycle().await.unwrap();
    assert!(matches!(
        next_frame(&mut rx).await,
        ServerMessage::NewCall { .. }
    ));

    // Exhausted script: the mock repeats the same snapshot.
    pipeline.poller.run_cycle().await.unwrap();
    assert!(matches!(
        next_frame(&mut rx).await,
        ServerMessage::CallUpdate { .. }
    ));

    pipeline.shutdown().await;
}

#[tokio::test]
async fn failed_client_does_not_stall_the_pipeline() {
    let pipeline = build_pipeline();
    let (_dead, dead_rx) = pipeline.hub.register().await;
    let (_live, mut live_rx) = pipeline.hub.register().await;
    drop(dead_rx);

    pipeline
        .mock
        .enqueue_snapshot(vec![Call::test_fixture("cad-300")]);
    pipeline.poller.run_cycle().await.unwrap();

    assert!(matches!(
        next_frame(&mut live_rx).await,
        ServerMessage::NewCall { .. }
    ));
    assert_eq!(pipeline.hub.client_count().await, 1);

    pipeline.shutdown().await;
}

fn sign(timestamp: i64, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(body);
    let signature = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp},v1={signature}")
}

fn webhook_body(event: &str, call_id: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "event": event,
        "timestamp": chrono::Utc::now().timestamp(),
        "call": Call::test_fixture(call_id),
        "source": "cad"
    }))
    .unwrap()
}

mod webhook_http {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn signed_webhook_flows_to_dashboard() {
        let pipeline = build_pipeline();
        let (_client, mut rx) = pipeline.hub.register().await;
        let app = router(pipeline.app_state(), Duration::from_secs(5));

        let body = webhook_body("call_updated", "cad-400");
        let signature = sign(chrono::Utc::now().timestamp(), &body);

        let response = app
            .oneshot(
                Request::post("/webhooks/cad")
                    .header(SIGNATURE_HEADER, signature)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        match next_frame(&mut rx).await {
            ServerMessage::CallUpdate { data, .. } => assert_eq!(data.id.as_str(), "cad-400"),
            other => panic!("expected call_update, got {other:?}"),
        }

        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn tampered_webhook_is_rejected_without_side_effects() {
        let pipeline = build_pipeline();
        let (_client, mut rx) = pipeline.hub.register().await;
        let app = router(pipeline.app_state(), Duration::from_secs(5));

        let body = webhook_body("call_created", "cad-500");
        let signature = sign(chrono::Utc::now().timestamp(), b"different body");

        let response = app
            .oneshot(
                Request::post("/webhooks/cad")
                    .header(SIGNATURE_HEADER, signature)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(rx.try_recv().is_err());
        assert!(pipeline
            .cache
            .get(&CallId::new("cad-500"))
            .await
            .unwrap()
            .is_none());

        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn missing_signature_is_unauthorized() {
        let pipeline = build_pipeline();
        let app = router(pipeline.app_state(), Duration::from_secs(5));

        let response = app
            .oneshot(
                Request::post("/webhooks/cad")
                    .header("content-type", "application/json")
                    .body(Body::from(webhook_body("call_created", "cad-501")))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn status_endpoint_reports_all_components() {
        let pipeline = build_pipeline();
        pipeline
            .mock
            .enqueue_snapshot(vec![Call::test_fixture("cad-600")]);
        pipeline.poller.run_cycle().await.unwrap();

        let app = router(pipeline.app_state(), Duration::from_secs(5));
        let response = app
            .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert!(json["poller"].is_object());
        assert!(json["relay"]["connected"].as_bool().unwrap());
        assert!(json["cache"]["entries"].is_u64());
        assert_eq!(json["clients"], 0);

        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn recent_calls_endpoint_honors_limit() {
        let pipeline = build_pipeline();
        for i in 0..5 {
            pipeline
                .cache
                .put(Call::test_fixture(&format!("cad-{i}")), TTL)
                .await
                .unwrap();
        }

        let app = router(pipeline.app_state(), Duration::from_secs(5));
        let response = app
            .oneshot(
                Request::get("/api/calls/recent?limit=2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["calls"].as_array().unwrap().len(), 2);

        pipeline.shutdown().await;
    }
}
