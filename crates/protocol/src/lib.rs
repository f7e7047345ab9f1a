//! Loners Protocol
//!
//! Shared types for talking to the Loners API. REST resources are plain JSON
//! over HTTP; real-time traffic is Socket.IO events carried in Engine.IO text
//! frames over a WebSocket.

pub mod client;
pub mod server;
pub mod types;
pub mod wire;

pub use client::ClientEvent;
pub use server::{MessageNotification, ServerEvent};
pub use types::*;
pub use wire::{EnginePacket, OpenHandshake, SocketPacket, WireError};
