//! HTTP surface: webhook ingress, status endpoints, WebSocket upgrade.

mod status;
mod webhook;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::adapters::relay::EventBroker;
use crate::adapters::websocket::{ws_handler, BroadcastHub};
use crate::application::Poller;
use crate::domain::ingress::WebhookVerifier;
use crate::ports::CallCache;

pub use webhook::SIGNATURE_HEADER;

/// Shared handler state, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<dyn CallCache>,
    pub broker: Arc<EventBroker>,
    pub hub: Arc<BroadcastHub>,
    pub poller: Arc<Poller>,
    pub verifier: Arc<WebhookVerifier>,
    /// Calls included in welcome hydration and the recent-calls endpoint.
    pub recent_limit: usize,
    /// Dashboard liveness ping interval.
    pub heartbeat_interval: Duration,
}

/// Builds the application router with the standard middleware stack.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/webhooks/cad", post(webhook::receive))
        .route("/api/status", get(status::status))
        .route("/api/calls/recent", get(status::recent_calls))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CorsLayer::permissive())
}
