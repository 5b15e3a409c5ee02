//! Core identifier types
//!
//! [`MessageId`] correlates a request with its response. It is deliberately a
//! different type from [`ProgressToken`](super::ProgressToken) even though both
//! share the same wire shape, so the two namespaces can never be mixed up.

use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON-RPC message identifier (string or integer)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    /// String identifier
    String(String),
    /// Numeric identifier
    Number(i64),
}

/// JSON-RPC request identifier
pub type RequestId = MessageId;

impl MessageId {
    /// Parse an identifier out of a raw JSON value.
    ///
    /// Only strings and integers are valid identifiers. Floats, `null`,
    /// booleans, arrays and objects yield `None`.
    #[must_use]
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(Self::String(s.clone())),
            serde_json::Value::Number(n) => n.as_i64().map(Self::Number),
            _ => None,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for MessageId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for MessageId {
    fn from(n: i32) -> Self {
        Self::Number(i64::from(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_id_wire_shapes() {
        assert_eq!(serde_json::to_value(MessageId::from(3)).unwrap(), json!(3));
        assert_eq!(
            serde_json::to_value(MessageId::from("abc")).unwrap(),
            json!("abc")
        );

        let parsed: MessageId = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(parsed, MessageId::Number(42));
    }

    #[test]
    fn test_from_value_rejects_non_identifiers() {
        assert_eq!(MessageId::from_value(&json!(1.5)), None);
        assert_eq!(MessageId::from_value(&json!(null)), None);
        assert_eq!(MessageId::from_value(&json!({"id": 1})), None);
        assert_eq!(
            MessageId::from_value(&json!("req-1")),
            Some(MessageId::from("req-1"))
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(MessageId::from(12).to_string(), "12");
        assert_eq!(MessageId::from("x-1").to_string(), "x-1");
    }
}
