//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the pipeline and the outside world. Adapters implement these ports.
//!
//! - `CadClient` - outbound snapshot fetch from the CAD API
//! - `CallCache` - authoritative expiring store of active calls
//! - `EventSink` - publishing call events onto the relay
//! - `EventHandler` - processing events delivered by the relay consumer

mod cad_client;
mod call_cache;
mod event_relay;

pub use cad_client::CadClient;
pub use call_cache::{CacheStats, CallCache};
pub use event_relay::{EventHandler, EventSink};
