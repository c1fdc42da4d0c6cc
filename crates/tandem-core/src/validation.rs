//! Structural checks for actions and metadata received from a peer.

use serde_json::Value;

use crate::error::ValidationError;
use crate::meta::{Meta, MetaId};
use crate::types::{Action, NodeId};

/// Check that a wire value can be used as an action.
pub fn validate_action(value: &Value) -> Result<(), ValidationError> {
    if value.is_object() {
        Ok(())
    } else {
        Err(ValidationError::ActionNotObject)
    }
}

/// Parse an action from its wire value.
pub fn parse_action(value: &Value) -> Result<Action, ValidationError> {
    Action::new(value.clone())
}

/// Parse metadata from its wire value.
///
/// The wire form is `{"id": [time, node, seq], "time": time}`. Unknown keys
/// are ignored and `added` is never read from the wire.
pub fn parse_meta(value: &Value) -> Result<Meta, ValidationError> {
    let object = value.as_object().ok_or(ValidationError::MetaNotObject)?;

    let id = object
        .get("id")
        .and_then(Value::as_array)
        .ok_or(ValidationError::InvalidId)?;
    let [time, node, seq] = id.as_slice() else {
        return Err(ValidationError::InvalidId);
    };
    let id_time = time.as_i64().ok_or(ValidationError::InvalidId)?;
    let node = node.as_str().ok_or(ValidationError::InvalidId)?;
    let seq = seq
        .as_u64()
        .and_then(|s| u32::try_from(s).ok())
        .ok_or(ValidationError::InvalidId)?;

    let time = object
        .get("time")
        .and_then(Value::as_i64)
        .ok_or(ValidationError::InvalidTime)?;

    Ok(Meta {
        id: MetaId {
            time: id_time,
            node: NodeId::new(node),
            seq,
        },
        time,
        added: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_meta() {
        let meta = parse_meta(&json!({ "id": [1, "test1", 0], "time": 1 })).unwrap();
        assert_eq!(meta.id, MetaId::new(1, "test1", 0));
        assert_eq!(meta.time, 1);
        assert_eq!(meta.added, 0);
    }

    #[test]
    fn test_parse_meta_ignores_added() {
        let meta = parse_meta(&json!({ "id": [1, "a", 0], "time": 1, "added": 9 })).unwrap();
        assert_eq!(meta.added, 0);
    }

    #[test]
    fn test_parse_meta_rejects_bad_shapes() {
        assert_eq!(parse_meta(&json!([])), Err(ValidationError::MetaNotObject));
        assert_eq!(parse_meta(&json!({})), Err(ValidationError::InvalidId));
        assert_eq!(
            parse_meta(&json!({ "id": [1, "a"], "time": 1 })),
            Err(ValidationError::InvalidId)
        );
        assert_eq!(
            parse_meta(&json!({ "id": [1, 2, 0], "time": 1 })),
            Err(ValidationError::InvalidId)
        );
        assert_eq!(
            parse_meta(&json!({ "id": [1, "a", -1], "time": 1 })),
            Err(ValidationError::InvalidId)
        );
        assert_eq!(
            parse_meta(&json!({ "id": [1, "a", 0], "time": "1" })),
            Err(ValidationError::InvalidTime)
        );
    }

    #[test]
    fn test_validate_action() {
        assert!(validate_action(&json!({})).is_ok());
        assert_eq!(
            validate_action(&json!(null)),
            Err(ValidationError::ActionNotObject)
        );
    }
}
