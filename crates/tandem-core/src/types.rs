//! Strong type definitions for Tandem.
//!
//! Actions are opaque to the engine, node identifiers are newtypes so they
//! cannot be confused with arbitrary strings.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::ValidationError;
use crate::validation::validate_action;

/// An opaque domain payload carried by the log.
///
/// The engine never looks inside an action beyond requiring it to be a
/// JSON object on the wire.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(Value);

impl Action {
    /// Wrap a JSON object.
    pub fn new(value: Value) -> Result<Self, ValidationError> {
        validate_action(&value)?;
        Ok(Self(value))
    }

    /// Build an action of the form `{"type": kind}`.
    pub fn of_type(kind: &str) -> Self {
        Self(serde_json::json!({ "type": kind }))
    }

    /// The `type` field, if the payload has one.
    pub fn action_type(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    /// Borrow the underlying JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Take the underlying JSON value.
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Action({})", self.0)
    }
}

impl TryFrom<Value> for Action {
    type Error = ValidationError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Identifier of a node (host) taking part in replication.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Length of generated random identifiers.
    pub const RANDOM_LEN: usize = 10;

    /// Create from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random alphanumeric node ID.
    pub fn random() -> Self {
        use rand::distributions::Alphanumeric;
        use rand::Rng;
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(Self::RANDOM_LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_requires_object() {
        assert!(Action::new(json!({ "type": "a" })).is_ok());
        assert!(Action::new(json!([1, 2])).is_err());
        assert!(Action::new(json!("a")).is_err());
    }

    #[test]
    fn test_action_type() {
        assert_eq!(Action::of_type("add").action_type(), Some("add"));
        let untyped = Action::new(json!({})).unwrap();
        assert_eq!(untyped.action_type(), None);
    }

    #[test]
    fn test_action_serializes_transparently() {
        let action = Action::of_type("a");
        assert_eq!(serde_json::to_string(&action).unwrap(), r#"{"type":"a"}"#);
    }

    #[test]
    fn test_node_id_random() {
        let a = NodeId::random();
        let b = NodeId::random();
        assert_eq!(a.as_str().len(), NodeId::RANDOM_LEN);
        assert_ne!(a, b);
    }
}
