//! Socket.IO v4 framing over Engine.IO v4 text frames
//!
//! Only the text subset is supported. Every WebSocket text frame is one
//! Engine.IO packet; Engine.IO `message` packets carry one Socket.IO packet.
//!
//! ```text
//! engine:  <kind><payload>          e.g. "0{...}", "2", "4<socket packet>"
//! socket:  <kind>[/<nsp>,][<ack>][<json>]   e.g. "0", "2[\"identify\",\"u1\"]"
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_NAMESPACE: &str = "/";

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("empty frame")]
    Empty,
    #[error("unknown packet kind {0:?}")]
    UnknownKind(char),
    #[error("unsupported packet kind {0:?}")]
    Unsupported(char),
    #[error("malformed event: {0}")]
    MalformedEvent(&'static str),
    #[error("invalid json payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Payload of the Engine.IO `open` packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(rename = "pingInterval")]
    pub ping_interval: u64,
    #[serde(rename = "pingTimeout")]
    pub ping_timeout: u64,
    #[serde(rename = "maxPayload", default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
    #[serde(default)]
    pub upgrades: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(frame: &str) -> Result<Self, WireError> {
        let mut chars = frame.chars();
        let kind = chars.next().ok_or(WireError::Empty)?;
        let rest = chars.as_str();
        match kind {
            '0' => Ok(EnginePacket::Open(serde_json::from_str(rest)?)),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(rest.to_string())),
            '3' => Ok(EnginePacket::Pong(rest.to_string())),
            '4' => Ok(EnginePacket::Message(rest.to_string())),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(WireError::UnknownKind(other)),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(handshake) => {
                format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
            }
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{data}"),
            EnginePacket::Pong(data) => format!("3{data}"),
            EnginePacket::Message(data) => format!("4{data}"),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        ack_id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

impl SocketPacket {
    /// Connect to the default namespace
    pub fn connect() -> Self {
        SocketPacket::Connect {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data: None,
        }
    }

    /// Event on the default namespace without an ack
    pub fn event(name: impl Into<String>, args: Vec<Value>) -> Self {
        SocketPacket::Event {
            namespace: DEFAULT_NAMESPACE.to_string(),
            ack_id: None,
            name: name.into(),
            args,
        }
    }

    pub fn decode(payload: &str) -> Result<Self, WireError> {
        let mut chars = payload.chars();
        let kind = chars.next().ok_or(WireError::Empty)?;
        match kind {
            '0'..='4' => {}
            '5' | '6' => return Err(WireError::Unsupported(kind)),
            other => return Err(WireError::UnknownKind(other)),
        }
        let mut rest = chars.as_str();

        let namespace = if rest.starts_with('/') {
            let (nsp, tail) = match rest.find(',') {
                Some(comma) => (&rest[..comma], &rest[comma + 1..]),
                None => (rest, ""),
            };
            rest = tail;
            nsp.to_string()
        } else {
            DEFAULT_NAMESPACE.to_string()
        };

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let ack_id = if digits > 0 {
            rest[..digits].parse::<u64>().ok()
        } else {
            None
        };
        let json = &rest[digits..];
        let data = if json.is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Value>(json)?)
        };

        match kind {
            '0' => Ok(SocketPacket::Connect { namespace, data }),
            '1' => Ok(SocketPacket::Disconnect { namespace }),
            '2' => {
                let (name, args) = split_event(data)?;
                Ok(SocketPacket::Event {
                    namespace,
                    ack_id,
                    name,
                    args,
                })
            }
            '3' => {
                let ack_id = ack_id.ok_or(WireError::MalformedEvent("ack without id"))?;
                let args = match data {
                    Some(Value::Array(items)) => items,
                    Some(_) => return Err(WireError::MalformedEvent("ack payload is not an array")),
                    None => Vec::new(),
                };
                Ok(SocketPacket::Ack {
                    namespace,
                    ack_id,
                    args,
                })
            }
            _ => Ok(SocketPacket::ConnectError { namespace, data }),
        }
    }

    pub fn encode(&self) -> String {
        let (kind, namespace, ack_id, data) = match self {
            SocketPacket::Connect { namespace, data } => ('0', namespace, None, data.clone()),
            SocketPacket::Disconnect { namespace } => ('1', namespace, None, None),
            SocketPacket::Event {
                namespace,
                ack_id,
                name,
                args,
            } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::from(name.as_str()));
                items.extend(args.iter().cloned());
                ('2', namespace, *ack_id, Some(Value::Array(items)))
            }
            SocketPacket::Ack {
                namespace,
                ack_id,
                args,
            } => ('3', namespace, Some(*ack_id), Some(Value::Array(args.clone()))),
            SocketPacket::ConnectError { namespace, data } => ('4', namespace, None, data.clone()),
        };

        let mut out = String::new();
        out.push(kind);
        if namespace != DEFAULT_NAMESPACE {
            out.push_str(namespace);
            out.push(',');
        }
        if let Some(id) = ack_id {
            out.push_str(&id.to_string());
        }
        if let Some(data) = data {
            out.push_str(&data.to_string());
        }
        out
    }

    /// Wrap as a complete Engine.IO text frame
    pub fn to_frame(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }
}

fn split_event(data: Option<Value>) -> Result<(String, Vec<Value>), WireError> {
    let Some(Value::Array(mut items)) = data else {
        return Err(WireError::MalformedEvent("event payload is not an array"));
    };
    if items.is_empty() {
        return Err(WireError::MalformedEvent("event payload is empty"));
    }
    match items.remove(0) {
        Value::String(name) => Ok((name, items)),
        _ => Err(WireError::MalformedEvent("event name is not a string")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_open_handshake() {
        let frame = r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
        match EnginePacket::decode(frame).unwrap() {
            EnginePacket::Open(open) => {
                assert_eq!(open.sid, "abc");
                assert_eq!(open.ping_interval, 25000);
                assert_eq!(open.max_payload, Some(1_000_000));
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn ping_is_answered_with_matching_pong() {
        let ping = EnginePacket::decode("2").unwrap();
        assert_eq!(ping, EnginePacket::Ping(String::new()));
        assert_eq!(EnginePacket::Pong(String::new()).encode(), "3");

        let upgrade_check = EnginePacket::decode("2check").unwrap();
        assert_eq!(upgrade_check, EnginePacket::Ping("check".into()));
    }

    #[test]
    fn connect_frame_for_default_namespace() {
        assert_eq!(SocketPacket::connect().to_frame(), "40");
    }

    #[test]
    fn decodes_connect_ack_with_sid() {
        let packet = SocketPacket::decode(r#"0{"sid":"xyz"}"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Connect {
                namespace: "/".into(),
                data: Some(json!({"sid": "xyz"})),
            }
        );
    }

    #[test]
    fn encodes_identify_event() {
        let frame = SocketPacket::event("identify", vec![json!("u1")]).to_frame();
        assert_eq!(frame, r#"42["identify","u1"]"#);
    }

    #[test]
    fn decodes_event_with_namespace_and_ack() {
        let packet = SocketPacket::decode(r#"2/admin,12["message:new",{"text":"yo"}]"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Event {
                namespace: "/admin".into(),
                ack_id: Some(12),
                name: "message:new".into(),
                args: vec![json!({"text": "yo"})],
            }
        );
        assert_eq!(packet.encode(), r#"2/admin,12["message:new",{"text":"yo"}]"#);
    }

    #[test]
    fn rejects_malformed_events() {
        assert!(matches!(
            SocketPacket::decode("2{}"),
            Err(WireError::MalformedEvent(_))
        ));
        assert!(matches!(
            SocketPacket::decode("2[]"),
            Err(WireError::MalformedEvent(_))
        ));
        assert!(matches!(
            SocketPacket::decode("2[42]"),
            Err(WireError::MalformedEvent(_))
        ));
        assert!(matches!(SocketPacket::decode("2[\"x\""), Err(WireError::Json(_))));
    }

    #[test]
    fn binary_packets_are_unsupported() {
        assert!(matches!(
            SocketPacket::decode(r#"51-["upload",{"_placeholder":true,"num":0}]"#),
            Err(WireError::Unsupported('5'))
        ));
    }

    #[test]
    fn unknown_engine_kind() {
        assert!(matches!(
            EnginePacket::decode("9"),
            Err(WireError::UnknownKind('9'))
        ));
        assert!(matches!(EnginePacket::decode(""), Err(WireError::Empty)));
    }

    #[test]
    fn disconnect_and_connect_error() {
        assert_eq!(
            SocketPacket::decode("1").unwrap(),
            SocketPacket::Disconnect {
                namespace: "/".into()
            }
        );
        match SocketPacket::decode(r#"4{"message":"Not authorized"}"#).unwrap() {
            SocketPacket::ConnectError { data, .. } => {
                assert_eq!(data, Some(json!({"message": "Not authorized"})));
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }
}
