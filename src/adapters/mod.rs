//! Adapters - implementations of the ports against real infrastructure.

pub mod cache;
pub mod cad;
pub mod http;
pub mod relay;
pub mod websocket;
