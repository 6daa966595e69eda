//! Webhook payload shape and external vocabulary mapping.

use serde::{Deserialize, Serialize};

use crate::domain::{Call, CallEvent, EventKind, EventSource};

use super::WebhookError;

/// Event names used by the CAD system's outbound notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalEventKind {
    CallCreated,
    CallUpdated,
    CallClosed,
}

impl From<ExternalEventKind> for EventKind {
    fn from(kind: ExternalEventKind) -> Self {
        match kind {
            ExternalEventKind::CallCreated => EventKind::New,
            ExternalEventKind::CallUpdated => EventKind::Update,
            ExternalEventKind::CallClosed => EventKind::Complete,
        }
    }
}

/// Body of a CAD webhook delivery: `{event, timestamp, call, source}`.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub event: ExternalEventKind,
    /// Unix timestamp set by the sender; informational only.
    pub timestamp: i64,
    pub call: Call,
    /// Free-form sender tag (e.g. "cad"); informational only.
    #[serde(default)]
    pub source: Option<String>,
}

impl WebhookPayload {
    /// Parses a raw (already verified) body.
    pub fn from_slice(body: &[u8]) -> Result<Self, WebhookError> {
        serde_json::from_slice(body).map_err(|e| WebhookError::ParseError(e.to_string()))
    }

    /// Converts this delivery into the internal event the poller would
    /// have produced for the same transition.
    pub fn into_event(self) -> CallEvent {
        CallEvent::new(self.event.into(), self.call, EventSource::Webhook)
    }
}
