//! WebSocket client library
//!
//! A reusable client with automatic reconnection, ping/pong keepalive, and an
//! optional subscription payload sent on every (re)connect.

mod client;
mod types;

pub use client::WsClient;
pub use types::{WsConfig, WsError, WsMessage};
