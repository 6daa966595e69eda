//! Webhook ingress domain logic.
//!
//! The CAD system can push state-change notifications instead of waiting
//! for the next poll cycle. This module owns the pieces that are pure
//! logic: signature verification and mapping the external event
//! vocabulary onto the internal `EventKind`.

mod payload;
mod verifier;

pub use payload::{ExternalEventKind, WebhookPayload};
pub use verifier::{SignatureHeader, WebhookVerifier};

use thiserror::Error;

/// Errors produced while verifying and parsing a webhook delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("webhook timestamp too old")]
    TimestampOutOfRange,

    #[error("webhook timestamp in the future")]
    InvalidTimestamp,

    #[error("failed to parse webhook: {0}")]
    ParseError(String),
}
