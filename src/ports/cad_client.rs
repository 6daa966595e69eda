//! CadClient port - Interface to the external CAD API.

use async_trait::async_trait;

use crate::domain::{Call, PipelineError};

/// Port for retrieving the current active-call snapshot from the CAD
/// system.
///
/// Implementations must:
/// - Return the **full** active-call list on every fetch (no partial or
///   incremental results are trusted by the poller)
/// - Normalize upstream payloads into domain `Call`s
/// - Filter out origins the pipeline does not track
/// - Raise on transport or auth failure rather than returning a partial
///   list
#[async_trait]
pub trait CadClient: Send + Sync {
    /// Fetches the complete list of currently active tracked calls.
    async fn fetch_active_calls(&self) -> Result<Vec<Call>, PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn CadClient) {}
}
