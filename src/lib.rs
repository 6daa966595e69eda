//! Dispatch Console - CAD call-sync pipeline
//!
//! Mirrors active emergency calls from an upstream CAD system into a
//! live dashboard: a poller diffs periodic snapshots against an expiring
//! call cache, classified events flow through a durable in-process relay,
//! and a WebSocket hub fans them out to connected consoles. A signed
//! webhook ingress feeds the same relay between polls.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
