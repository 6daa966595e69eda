//! CAD webhook ingress endpoint.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use super::AppState;
use crate::domain::ingress::{WebhookError, WebhookPayload};

/// Header carrying the `t=<unix>,v1=<hex>` signature.
pub const SIGNATURE_HEADER: &str = "x-dispatch-signature";

/// `POST /webhooks/cad`
///
/// Signature verification runs before the body is interpreted; a
/// delivery that fails it is rejected without touching cache or relay.
/// Accepted payloads publish onto the relay exactly as poll-produced
/// events do.
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = match headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) {
        Some(value) => value,
        None => {
            tracing::warn!("webhook delivery missing signature header");
            return error_response(StatusCode::UNAUTHORIZED, "missing signature");
        }
    };

    if let Err(error) = state.verifier.verify(&body, signature) {
        tracing::warn!(%error, "webhook signature rejected");
        return error_response(StatusCode::UNAUTHORIZED, "invalid signature");
    }

    let payload = match WebhookPayload::from_slice(&body) {
        Ok(payload) => payload,
        Err(WebhookError::ParseError(detail)) => {
            tracing::warn!(detail = %detail, "webhook body unparseable");
            return error_response(StatusCode::BAD_REQUEST, "invalid payload");
        }
        Err(error) => {
            tracing::error!(%error, "unexpected webhook payload failure");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "processing failed");
        }
    };

    let event = payload.into_event();
    tracing::info!(
        event_id = %event.id,
        call_id = %event.call_id,
        routing_key = %event.kind,
        "webhook event accepted"
    );

    if !state.broker.publish(event) {
        tracing::error!("relay unavailable, webhook event not published");
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "relay unavailable");
    }

    (StatusCode::OK, Json(json!({ "status": "accepted" }))).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
