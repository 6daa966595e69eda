//! Wire messages exchanged with dashboard clients.

use serde::{Deserialize, Serialize};

use crate::domain::{Call, CallEvent, CallId, EventKind, Timestamp};

/// Messages pushed from the server to dashboard clients.
///
/// Serialized as `{"type": ..., "data": ..., "timestamp": ...}` with a
/// snake_case type tag.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First frame after connect: the currently active calls, newest
    /// first, so the dashboard renders without waiting for events.
    Welcome {
        data: Vec<Call>,
        timestamp: Timestamp,
    },
    NewCall {
        data: Call,
        timestamp: Timestamp,
    },
    CallUpdate {
        data: Call,
        timestamp: Timestamp,
    },
    CallClosed {
        data: ClosedCall,
        timestamp: Timestamp,
    },
    Pong {
        timestamp: Timestamp,
    },
}

/// Payload of a `call_closed` frame. Clients only need the id to drop
/// the row.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClosedCall {
    pub call_id: CallId,
}

impl ServerMessage {
    pub fn welcome(active_calls: Vec<Call>) -> Self {
        Self::Welcome {
            data: active_calls,
            timestamp: Timestamp::now(),
        }
    }

    pub fn pong() -> Self {
        Self::Pong {
            timestamp: Timestamp::now(),
        }
    }

    /// Maps a relay event to its dashboard frame.
    pub fn from_event(event: &CallEvent) -> Self {
        match event.kind {
            EventKind::New => Self::NewCall {
                data: event.call.clone(),
                timestamp: event.occurred_at,
            },
            EventKind::Update => Self::CallUpdate {
                data: event.call.clone(),
                timestamp: event.occurred_at,
            },
            EventKind::Complete => Self::CallClosed {
                data: ClosedCall {
                    call_id: event.call_id.clone(),
                },
                timestamp: event.occurred_at,
            },
        }
    }
}

/// Messages accepted from dashboard clients. Anything else is ignored.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
}
