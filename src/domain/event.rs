//! Call state-transition events, the unit of transport through the relay.
//!
//! Events are created once by the poller or webhook ingress and never
//! mutated. The closed `EventKind` enum keeps consumer and broadcast
//! dispatch exhaustive at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{Call, CallId, Priority, Timestamp};

/// Unique identifier for an event instance (deduplication, logging).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Creates a new random EventId using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three state transitions a call can go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    New,
    Update,
    Complete,
}

impl EventKind {
    /// Routing key used by the relay's topic exchange.
    pub fn routing_key(&self) -> &'static str {
        match self {
            EventKind::New => "calls.new",
            EventKind::Update => "calls.update",
            EventKind::Complete => "calls.complete",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.routing_key())
    }
}

/// Which path produced an event. The relay consumer treats both the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Poll,
    Webhook,
}

/// Immutable record of a call's creation, update, or completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEvent {
    pub id: EventId,
    pub call_id: CallId,
    pub kind: EventKind,
    /// Full call payload at the moment of observation.
    pub call: Call,
    pub priority: Priority,
    pub occurred_at: Timestamp,
    pub source: EventSource,
}

impl CallEvent {
    /// Creates an event for the given transition, stamping id and time.
    pub fn new(kind: EventKind, call: Call, source: EventSource) -> Self {
        Self {
            id: EventId::new(),
            call_id: call.id.clone(),
            priority: call.priority,
            kind,
            call,
            occurred_at: Timestamp::now(),
            source,
        }
    }

    /// Convenience constructor for a `new` transition.
    pub fn created(call: Call, source: EventSource) -> Self {
        Self::new(EventKind::New, call, source)
    }

    /// Convenience constructor for an `update` transition.
    pub fn updated(call: Call, source: EventSource) -> Self {
        Self::new(EventKind::Update, call, source)
    }

    /// Convenience constructor for a `complete` transition.
    pub fn completed(call: Call, source: EventSource) -> Self {
        Self::new(EventKind::Complete, call, source)
    }
}
