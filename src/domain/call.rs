//! The central entity of the pipeline: an active emergency call.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Timestamp;

/// Opaque external call identifier, stable across the call's lifetime.
///
/// Assigned by the upstream CAD system; the pipeline never inspects or
/// generates these, only keys on them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    /// Creates a CallId from an external identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CallId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Where a call entered the CAD system.
///
/// Only emergency-line calls are tracked by this pipeline; dispatcher-created
/// entries are filtered out at the CAD adapter boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOrigin {
    EmergencyLine,
    DispatcherCreated,
}

impl CallOrigin {
    /// Whether calls with this origin flow through the pipeline.
    pub fn is_tracked(&self) -> bool {
        matches!(self, CallOrigin::EmergencyLine)
    }
}

/// Ordinal call severity. Used for display ordering only, never for
/// processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub u8);

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An active emergency call as mirrored from the CAD system.
///
/// `location`, `description`, and `units` are descriptive payload, opaque
/// to the pipeline and passed through to clients unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub id: CallId,
    pub origin: CallOrigin,
    pub priority: Priority,
    pub location: String,
    pub description: String,
    /// Assigned units; shape is owned by the CAD system.
    pub units: serde_json::Value,
    /// Most recent confirmation from the source system; drives cache TTL.
    pub last_seen_at: Timestamp,
}

impl Call {
    /// Returns a copy with `last_seen_at` refreshed to now.
    pub fn observed_now(mut self) -> Self {
        self.last_seen_at = Timestamp::now();
        self
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Call {
    /// Creates a minimal emergency-line call fixture.
    pub fn test_fixture(id: &str) -> Self {
        Self {
            id: CallId::new(id),
            origin: CallOrigin::EmergencyLine,
            priority: Priority(2),
            location: "4000 Capitol Blvd".to_string(),
            description: "Structure fire".to_string(),
            units: serde_json::json!(["E-14", "L-3"]),
            last_seen_at: Timestamp::now(),
        }
    }
}
