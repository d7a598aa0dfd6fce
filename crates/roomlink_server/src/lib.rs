//! Roomlink Server - HTTP and WebSocket surface
//!
//! This crate owns the network side of the bridge:
//! - per-connection state for browser clients
//! - the downlink broadcast loop (mixed frames → every client)
//! - uplink intake (browser mic frames → the browser ring)
//! - server-side downlink ducking while a browser speaks
//! - the minimal HTTP surface (`/health`, `/status`, `/sdk-info`, `/stream`)
//!
//! The WebSocket layer owns no mixer state: it reads from the downlink
//! queue and writes into the browser ring, so either side can be
//! re-created independently.

pub mod broadcast;
pub mod http;
pub mod protocol;
pub mod state;
pub mod ws;

pub use state::{Peer, ServerState};
