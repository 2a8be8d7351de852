//! # nexus-server
//!
//! Realtime relay for the Nexus chat client.
//!
//! - **Hub**: one task owns the session registry, room membership,
//!   conversation directory and message store, and applies client events
//!   in arrival order
//! - **WebSocket sessions**: JSON frames in, per-connection queues out
//! - **REST API** (axum): health, instance info and state snapshots
//!
//! All state is in memory and lost on restart.

pub mod api;
pub mod config;
pub mod connections;
pub mod directory;
pub mod error;
pub mod hub;
pub mod registry;
pub mod rooms;
pub mod router;
pub mod session;
pub mod store;
