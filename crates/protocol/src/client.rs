//! Client → Server push events

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const IDENTIFY: &str = "identify";
pub const JOIN: &str = "join";
pub const LEAVE: &str = "leave";
pub const MESSAGE_SEND: &str = "message:send";
pub const PING: &str = "ping";

/// Payload of `message:send`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    #[serde(rename = "eventId")]
    pub event_id: String,
    pub text: String,
    pub sender: String,
}

/// Events emitted by the client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Bind this connection to a user so the server routes room events here
    Identify { user_id: String },
    Join { room_id: String },
    Leave { room_id: String },
    SendMessage(OutgoingMessage),
    Ping,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Identify { .. } => IDENTIFY,
            ClientEvent::Join { .. } => JOIN,
            ClientEvent::Leave { .. } => LEAVE,
            ClientEvent::SendMessage(_) => MESSAGE_SEND,
            ClientEvent::Ping => PING,
        }
    }

    /// Arguments following the event name in the Socket.IO array
    pub fn args(&self) -> Vec<Value> {
        match self {
            ClientEvent::Identify { user_id } => vec![Value::from(user_id.as_str())],
            ClientEvent::Join { room_id } | ClientEvent::Leave { room_id } => {
                vec![Value::from(room_id.as_str())]
            }
            ClientEvent::SendMessage(msg) => {
                vec![serde_json::to_value(msg).unwrap_or(Value::Null)]
            }
            ClientEvent::Ping => Vec::new(),
        }
    }
}
