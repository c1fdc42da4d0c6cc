//! Wire vectors: malformed messages with the exact reply they must produce.
//!
//! Every vector is fatal to the connection. The reply carries the original
//! message text as compact JSON, so these also pin the text encoding.

use serde_json::{json, Value};

/// A malformed incoming message and its expected `error` reply.
#[derive(Debug, Clone)]
pub struct WireVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Message sent to the engine.
    pub message: Value,
    /// Error kind of the reply.
    pub kind: &'static str,
    /// Details of the reply.
    pub details: &'static str,
}

impl WireVector {
    /// The full `error` message the engine must send back.
    pub fn expected_reply(&self) -> Value {
        json!(["error", self.kind, self.details])
    }
}

/// Get all wire vectors.
pub fn malformed_vectors() -> Vec<WireVector> {
    vec![
        WireVector {
            name: "sync without arguments",
            message: json!(["sync"]),
            kind: "wrong-format",
            details: r#"["sync"]"#,
        },
        WireVector {
            name: "sync with action but no meta",
            message: json!(["sync", 0, { "type": "a" }]),
            kind: "wrong-format",
            details: r#"["sync",0,{"type":"a"}]"#,
        },
        WireVector {
            name: "sync with array meta",
            message: json!(["sync", 0, { "type": "a" }, []]),
            kind: "wrong-format",
            details: r#"["sync",0,{"type":"a"},[]]"#,
        },
        WireVector {
            name: "sync with empty meta",
            message: json!(["sync", 0, {}, {}]),
            kind: "wrong-format",
            details: r#"["sync",0,{},{}]"#,
        },
        WireVector {
            name: "sync with string watermark",
            message: json!(["sync", "1", { "type": "a" }, { "id": [1, "test1", 0], "time": 1 }]),
            kind: "wrong-format",
            details: r#"["sync","1",{"type":"a"},{"id":[1,"test1",0],"time":1}]"#,
        },
        WireVector {
            name: "synced without watermark",
            message: json!(["synced"]),
            kind: "wrong-format",
            details: r#"["synced"]"#,
        },
        WireVector {
            name: "synced with string watermark",
            message: json!(["synced", "abc"]),
            kind: "wrong-format",
            details: r#"["synced","abc"]"#,
        },
        WireVector {
            name: "ping with negative value",
            message: json!(["ping", -1]),
            kind: "wrong-format",
            details: r#"["ping",-1]"#,
        },
        WireVector {
            name: "bare string",
            message: json!("sync"),
            kind: "wrong-format",
            details: r#""sync""#,
        },
        WireVector {
            name: "unknown kind",
            message: json!(["hello"]),
            kind: "unknown-message",
            details: "hello",
        },
    ]
}
