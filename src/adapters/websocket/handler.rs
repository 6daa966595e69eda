//! Axum WebSocket endpoint for dashboard clients.
//!
//! Connection lifecycle: upgrade, register with the hub, send the
//! `welcome` hydration frame, then forward hub frames outward while
//! answering client pings. A client that stops pinging for two heartbeat
//! intervals is disconnected.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::time::{interval, Instant};

use super::messages::{ClientMessage, ServerMessage};
use crate::adapters::http::AppState;

/// `GET /ws` upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client_id, mut outbound) = state.hub.register().await;
    tracing::info!(%client_id, "dashboard connected");

    let (mut sink, mut stream) = socket.split();

    // Hydrate before forwarding live frames, so the first frame the
    // client sees is always the welcome snapshot.
    let active = match state.cache.list_recent(state.recent_limit).await {
        Ok(calls) => calls,
        Err(error) => {
            tracing::warn!(%client_id, %error, "hydration fetch failed, sending empty welcome");
            Vec::new()
        }
    };
    if send_frame(&mut sink, &ServerMessage::welcome(active))
        .await
        .is_err()
    {
        state.hub.unregister(&client_id).await;
        return;
    }

    let heartbeat = state.heartbeat_interval;
    let mut ticker = interval(heartbeat);
    ticker.reset();
    let mut last_ping = Instant::now();

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                match frame {
                    Some(message) => {
                        if send_frame(&mut sink, &message).await.is_err() {
                            break;
                        }
                    }
                    // Hub dropped our channel: shutdown or eviction.
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Ping) => {
                                last_ping = Instant::now();
                                state.hub.send_to(&client_id, ServerMessage::pong()).await;
                            }
                            Err(_) => {
                                tracing::debug!(%client_id, "ignoring unrecognized client frame");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        last_ping = Instant::now();
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        tracing::debug!(%client_id, %error, "socket read error");
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                if liveness_expired(last_ping, Instant::now(), heartbeat) {
                    tracing::info!(%client_id, "no ping within two heartbeats, disconnecting");
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    state.hub.unregister(&client_id).await;
    tracing::info!(%client_id, "dashboard disconnected");
}

/// A client that has not pinged for two full heartbeat intervals is
/// considered dead and gets force-closed.
fn liveness_expired(last_ping: Instant, now: Instant, heartbeat: Duration) -> bool {
    now.saturating_duration_since(last_ping) >= heartbeat * 2
}

async fn send_frame(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(error) => {
            tracing::error!(%error, "failed to serialize server frame");
            return Ok(());
        }
    };
    sink.send(Message::Text(json)).await
}
