//! Server → Client push events

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ChatMessage;

pub const MESSAGE_NEW: &str = "message:new";
pub const MESSAGE_NOTIFICATION: &str = "message:notification";

/// Cross-room badge signal sent to every participant not in the room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageNotification {
    #[serde(rename = "eventId")]
    pub event_id: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub text: String,
}

/// Events received from the server
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    MessageNew(ChatMessage),
    MessageNotification(MessageNotification),
    /// Anything this crate has no model for
    Other { name: String, args: Vec<Value> },
}

impl ServerEvent {
    /// Build a typed event from a Socket.IO event name and its arguments.
    ///
    /// Known names with a payload that does not match the model are errors;
    /// unknown names are kept verbatim.
    pub fn decode(name: String, mut args: Vec<Value>) -> Result<Self, serde_json::Error> {
        match name.as_str() {
            MESSAGE_NEW => {
                let payload = first_arg(&mut args);
                Ok(ServerEvent::MessageNew(serde_json::from_value(payload)?))
            }
            MESSAGE_NOTIFICATION => {
                let payload = first_arg(&mut args);
                Ok(ServerEvent::MessageNotification(serde_json::from_value(
                    payload,
                )?))
            }
            _ => Ok(ServerEvent::Other { name, args }),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ServerEvent::MessageNew(_) => MESSAGE_NEW,
            ServerEvent::MessageNotification(_) => MESSAGE_NOTIFICATION,
            ServerEvent::Other { name, .. } => name,
        }
    }
}

fn first_arg(args: &mut Vec<Value>) -> Value {
    if args.is_empty() {
        Value::Null
    } else {
        args.swap_remove(0)
    }
}
