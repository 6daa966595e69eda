//! Event relay ports - publishing into and handling events out of the
//! durable relay.

use async_trait::async_trait;

use crate::domain::{CallEvent, PipelineError};

/// Port for publishing call events onto the relay.
///
/// Implementations must fail fast while the relay transport is down:
/// `publish` returns `Ok(false)` rather than blocking, so a producer can
/// skip a cycle's event emission without hanging.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publishes an event, routed by its kind.
    ///
    /// Returns `Ok(true)` when the relay accepted the event, `Ok(false)`
    /// when the relay is disconnected/closed. `Err` is reserved for
    /// payload problems, never for transport unavailability.
    async fn publish(&self, event: CallEvent) -> Result<bool, PipelineError>;
}

/// Handler invoked by the relay consumer for each delivered event.
///
/// Implementations must be idempotent: at-least-once delivery means the
/// same event may be handled more than once (re-applying a `new` event to
/// an already-cached call degrades gracefully to an update).
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Processes one delivered event.
    ///
    /// A transient error (`PipelineError::is_transient()`) leads to
    /// redelivery; a permanent one dead-letters the message.
    async fn handle(&self, event: CallEvent) -> Result<(), PipelineError>;

    /// Handler name for logging.
    fn name(&self) -> &'static str;
}
