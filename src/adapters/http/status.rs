//! Read-only status and recent-calls endpoints.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use super::AppState;

const DEFAULT_RECENT_LIMIT: usize = 50;
const MAX_RECENT_LIMIT: usize = 200;

/// `GET /api/status`
pub async fn status(State(state): State<AppState>) -> Response {
    let cache_stats = match state.cache.stats().await {
        Ok(stats) => json!(stats),
        Err(error) => {
            tracing::warn!(%error, "cache stats unavailable");
            json!({ "error": error.to_string() })
        }
    };

    let body = json!({
        "poller": state.poller.stats(),
        "relay": state.broker.stats(),
        "cache": cache_stats,
        "clients": state.hub.client_count().await,
    });

    (StatusCode::OK, Json(body)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    limit: Option<usize>,
}

/// `GET /api/calls/recent?limit=N`
pub async fn recent_calls(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .min(MAX_RECENT_LIMIT);

    match state.cache.list_recent(limit).await {
        Ok(calls) => (StatusCode::OK, Json(json!({ "calls": calls }))).into_response(),
        Err(error) => {
            tracing::error!(%error, "recent calls lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "cache unavailable" })),
            )
                .into_response()
        }
    }
}
