//! WebSocket adapter - dashboard fan-out.

mod handler;
mod hub;
mod messages;

pub use handler::ws_handler;
pub use hub::{BroadcastHub, ClientId, HubStats};
pub use messages::{ClientMessage, ClosedCall, ServerMessage};
