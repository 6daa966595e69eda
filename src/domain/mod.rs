//! Domain layer - pure types for the call-sync pipeline.
//!
//! No I/O here: calls, events, errors, timestamps, and the webhook
//! verification/mapping logic. Everything that touches a socket lives in
//! `adapters`.

mod call;
mod errors;
mod event;
mod timestamp;

pub mod ingress;

pub use call::{Call, CallId, CallOrigin, Priority};
pub use errors::{ErrorCode, PipelineError};
pub use event::{CallEvent, EventId, EventKind, EventSource};
pub use timestamp::Timestamp;
