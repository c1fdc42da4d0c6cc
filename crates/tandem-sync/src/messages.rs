//! Sync protocol message types.
//!
//! Messages travel as JSON arrays whose first element names the kind:
//!
//! ```text
//! connect:   ["connect", protocolVersion, hostId, time]
//! connected: ["connected", protocolVersion, hostId, time]
//! ping:      ["ping", synced]
//! pong:      ["pong", synced]
//! sync:      ["sync", watermark, action, meta, action, meta, ...]
//! synced:    ["synced", watermark]
//! error:     ["error", kind, details]
//! ```
//!
//! Parsing validates the full shape; anything else is a `wrong-format`
//! violation carrying the original message text.

use serde_json::{json, Value};

use tandem_core::{parse_action, parse_meta, Action, Meta, NodeId};

use crate::error::SyncError;

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Wire names of error kinds.
pub mod error_kind {
    pub const WRONG_FORMAT: &str = "wrong-format";
    pub const WRONG_PROTOCOL: &str = "wrong-protocol";
    pub const UNKNOWN_MESSAGE: &str = "unknown-message";
    pub const TIMEOUT: &str = "timeout";
}

/// Sync protocol messages.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Handshake request from the active side.
    Connect {
        protocol: u32,
        node_id: NodeId,
        /// Sender's local time; optional on the wire.
        time: Option<i64>,
    },

    /// Handshake reply from the passive side.
    Connected {
        protocol: u32,
        node_id: NodeId,
        time: Option<i64>,
    },

    /// Keepalive request carrying the sender's `synced`.
    Ping(u64),

    /// Keepalive reply carrying the sender's `synced`.
    Pong(u64),

    /// New entries, in ascending `added` order of the sender.
    Sync {
        /// Sender's newest `added` covered by this batch.
        watermark: u64,
        entries: Vec<(Action, Meta)>,
    },

    /// Acknowledges a `Sync` up to the watermark.
    Synced(u64),

    /// Error condition.
    Error { kind: String, details: Value },
}

impl Message {
    /// The wire name of this message kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Connect { .. } => "connect",
            Message::Connected { .. } => "connected",
            Message::Ping(_) => "ping",
            Message::Pong(_) => "pong",
            Message::Sync { .. } => "sync",
            Message::Synced(_) => "synced",
            Message::Error { .. } => "error",
        }
    }

    /// Encode to the wire array.
    pub fn to_value(&self) -> Value {
        match self {
            Message::Connect {
                protocol,
                node_id,
                time,
            }
            | Message::Connected {
                protocol,
                node_id,
                time,
            } => {
                let mut parts = vec![json!(self.kind()), json!(protocol), json!(node_id)];
                if let Some(time) = time {
                    parts.push(json!(time));
                }
                Value::Array(parts)
            }
            Message::Ping(synced) | Message::Pong(synced) => json!([self.kind(), synced]),
            Message::Sync { watermark, entries } => {
                let mut parts = Vec::with_capacity(2 + entries.len() * 2);
                parts.push(json!("sync"));
                parts.push(json!(watermark));
                for (action, meta) in entries {
                    parts.push(action.as_value().clone());
                    parts.push(json!(meta));
                }
                Value::Array(parts)
            }
            Message::Synced(watermark) => json!(["synced", watermark]),
            Message::Error { kind, details } => json!(["error", kind, details]),
        }
    }

    /// Build the error reply for a fatal protocol violation.
    pub fn error_for(err: &SyncError) -> Option<Message> {
        let kind = err.wire_kind()?;
        let details = match err {
            SyncError::WrongFormat(raw) => json!(raw),
            SyncError::UnknownMessage(name) => json!(name),
            SyncError::WrongProtocol { local, peer } => {
                json!({ "supported": local, "used": peer })
            }
            other => json!(other.to_string()),
        };
        Some(Message::Error {
            kind: kind.to_owned(),
            details,
        })
    }

    /// Parse and validate a wire message.
    pub fn parse(raw: &Value) -> Result<Message, SyncError> {
        let wrong_format = || SyncError::WrongFormat(raw.to_string());

        let parts = raw.as_array().ok_or_else(wrong_format)?;
        let name = parts
            .first()
            .and_then(Value::as_str)
            .ok_or_else(wrong_format)?;
        let args = &parts[1..];

        match name {
            "connect" | "connected" => {
                let (protocol, node_id, time) =
                    parse_handshake(args).ok_or_else(wrong_format)?;
                Ok(if name == "connect" {
                    Message::Connect {
                        protocol,
                        node_id,
                        time,
                    }
                } else {
                    Message::Connected {
                        protocol,
                        node_id,
                        time,
                    }
                })
            }
            "ping" | "pong" => {
                let synced = single_counter(args).ok_or_else(wrong_format)?;
                Ok(if name == "ping" {
                    Message::Ping(synced)
                } else {
                    Message::Pong(synced)
                })
            }
            "sync" => {
                // at least one pair, and pairs only
                if args.len() < 3 || (args.len() - 1) % 2 != 0 {
                    return Err(wrong_format());
                }
                let watermark = args[0].as_u64().ok_or_else(wrong_format)?;
                let entries = args[1..]
                    .chunks(2)
                    .map(|pair| {
                        let action = parse_action(&pair[0]).ok()?;
                        let meta = parse_meta(&pair[1]).ok()?;
                        Some((action, meta))
                    })
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(wrong_format)?;
                Ok(Message::Sync { watermark, entries })
            }
            "synced" => {
                let watermark = single_counter(args).ok_or_else(wrong_format)?;
                Ok(Message::Synced(watermark))
            }
            "error" => {
                let kind = args
                    .first()
                    .and_then(Value::as_str)
                    .filter(|_| args.len() <= 2)
                    .ok_or_else(wrong_format)?;
                Ok(Message::Error {
                    kind: kind.to_owned(),
                    details: args.get(1).cloned().unwrap_or(Value::Null),
                })
            }
            other => Err(SyncError::UnknownMessage(other.to_owned())),
        }
    }
}

/// `[protocol, node_id, time?]`
fn parse_handshake(args: &[Value]) -> Option<(u32, NodeId, Option<i64>)> {
    if !(2..=3).contains(&args.len()) {
        return None;
    }
    let protocol = args[0].as_u64().and_then(|v| u32::try_from(v).ok())?;
    let node_id = NodeId::new(args[1].as_str()?);
    let time = match args.get(2) {
        Some(value) => Some(value.as_i64()?),
        None => None,
    };
    Some((protocol, node_id, time))
}

fn single_counter(args: &[Value]) -> Option<u64> {
    match args {
        [value] => value.as_u64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::MetaId;

    #[test]
    fn test_sync_wire_shape() {
        let msg = Message::Sync {
            watermark: 1,
            entries: vec![(Action::of_type("a"), Meta::new(MetaId::new(1, "test1", 0)))],
        };
        assert_eq!(
            msg.to_value(),
            json!(["sync", 1, { "type": "a" }, { "id": [1, "test1", 0], "time": 1 }])
        );
        assert_eq!(Message::parse(&msg.to_value()).unwrap(), msg);
    }

    #[test]
    fn test_parse_multiple_pairs() {
        let raw = json!([
            "sync", 2,
            { "type": "a" }, { "id": [1, "test2", 0], "time": 1 },
            { "type": "b" }, { "id": [2, "test2", 0], "time": 2, "added": 2 }
        ]);
        let Message::Sync { watermark, entries } = Message::parse(&raw).unwrap() else {
            panic!("expected Sync");
        };
        assert_eq!(watermark, 2);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].0, Action::of_type("b"));
        assert_eq!(entries[1].1.added, 0);
    }

    #[test]
    fn test_handshake_time_optional() {
        let msg = Message::parse(&json!(["connected", 1, "server"])).unwrap();
        assert_eq!(
            msg,
            Message::Connected {
                protocol: 1,
                node_id: NodeId::new("server"),
                time: None
            }
        );

        let msg = Message::parse(&json!(["connect", 1, "client", 42])).unwrap();
        assert!(matches!(msg, Message::Connect { time: Some(42), .. }));
    }

    #[test]
    fn test_wrong_format_keeps_original_text() {
        let cases = [
            (json!(["sync"]), r#"["sync"]"#),
            (json!(["sync", 0, { "type": "a" }]), r#"["sync",0,{"type":"a"}]"#),
            (json!(["sync", 0, { "type": "a" }, []]), r#"["sync",0,{"type":"a"},[]]"#),
            (json!(["sync", 0, {}, {}]), r#"["sync",0,{},{}]"#),
            (json!(["synced"]), r#"["synced"]"#),
            (json!(["synced", "abc"]), r#"["synced","abc"]"#),
            (json!(["ping", -1]), r#"["ping",-1]"#),
            (json!("sync"), r#""sync""#),
            (json!([]), "[]"),
        ];
        for (raw, text) in cases {
            match Message::parse(&raw) {
                Err(SyncError::WrongFormat(got)) => assert_eq!(got, text),
                other => panic!("expected wrong-format for {raw}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_unknown_message() {
        assert!(matches!(
            Message::parse(&json!(["hello", 1])),
            Err(SyncError::UnknownMessage(name)) if name == "hello"
        ));
    }

    #[test]
    fn test_error_reply() {
        let reply = Message::error_for(&SyncError::WrongFormat(r#"["synced"]"#.into())).unwrap();
        assert_eq!(
            reply.to_value(),
            json!(["error", "wrong-format", r#"["synced"]"#])
        );

        let reply = Message::error_for(&SyncError::WrongProtocol { local: 1, peer: 0 }).unwrap();
        assert_eq!(
            reply.to_value(),
            json!(["error", "wrong-protocol", { "supported": 1, "used": 0 }])
        );

        assert!(Message::error_for(&SyncError::Closed).is_none());
    }
}
