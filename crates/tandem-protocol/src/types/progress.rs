//! Progress types
//!
//! A requester opts into progress by placing a token under
//! `params._meta.progressToken`. The responder then reports under that token
//! with `notifications/progress`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{Error, Result};

/// Token linking progress notifications to the request that authorized them
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    /// String token
    String(String),
    /// Integer token
    Number(i64),
}

impl fmt::Display for ProgressToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<String> for ProgressToken {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for ProgressToken {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for ProgressToken {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

/// Request metadata carried under `params._meta`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestMeta {
    /// Token the responder must use for progress notifications
    #[serde(rename = "progressToken", skip_serializing_if = "Option::is_none")]
    pub progress_token: Option<ProgressToken>,
}

impl RequestMeta {
    /// Read the progress token out of raw request params, if the sender opted in.
    ///
    /// Malformed `_meta` blocks are treated as "no token" rather than failing
    /// the whole request.
    #[must_use]
    pub fn progress_token(params: Option<&Value>) -> Option<ProgressToken> {
        let meta = params?.get("_meta")?;
        serde_json::from_value::<Self>(meta.clone())
            .ok()
            .and_then(|m| m.progress_token)
    }

    /// Attach a progress token to outgoing request params.
    ///
    /// Absent params become `{"_meta": {"progressToken": ...}}`. Existing
    /// `_meta` keys are preserved.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParams` when params are present but not a JSON object,
    /// since positional params have nowhere to carry metadata.
    pub fn attach_progress_token(params: Option<Value>, token: &ProgressToken) -> Result<Value> {
        let mut object = match params {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(Error::invalid_params(
                    "progress tokens require object-shaped params",
                ));
            }
        };

        let meta = object
            .entry("_meta")
            .or_insert_with(|| Value::Object(Map::new()));
        match meta {
            Value::Object(meta) => {
                meta.insert("progressToken".to_string(), serde_json::to_value(token)?);
            }
            _ => return Err(Error::invalid_params("`_meta` must be an object")),
        }

        Ok(Value::Object(object))
    }
}

/// Parameters of `notifications/progress`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressNotification {
    /// Token from the originating request
    #[serde(rename = "progressToken")]
    pub progress_token: ProgressToken,
    /// Progress so far; must increase with every notification
    pub progress: f64,
    /// Total amount of work, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    /// Human-readable progress message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_progress_token_extraction() {
        let params = json!({"name": "x", "_meta": {"progressToken": "abc123"}});
        assert_eq!(
            RequestMeta::progress_token(Some(&params)),
            Some(ProgressToken::from("abc123"))
        );

        let params = json!({"_meta": {"progressToken": 12345}});
        assert_eq!(
            RequestMeta::progress_token(Some(&params)),
            Some(ProgressToken::Number(12345))
        );

        assert_eq!(RequestMeta::progress_token(Some(&json!({"a": 1}))), None);
        assert_eq!(RequestMeta::progress_token(None), None);
    }

    #[test]
    fn test_attach_preserves_existing_fields() {
        let params = json!({"query": "q", "_meta": {"trace": "t-1"}});
        let token = ProgressToken::from("p-1");

        let attached = RequestMeta::attach_progress_token(Some(params), &token).unwrap();
        assert_eq!(attached["query"], "q");
        assert_eq!(attached["_meta"]["trace"], "t-1");
        assert_eq!(attached["_meta"]["progressToken"], "p-1");
    }

    #[test]
    fn test_attach_to_absent_params() {
        let token = ProgressToken::Number(9);
        let attached = RequestMeta::attach_progress_token(None, &token).unwrap();
        assert_eq!(attached, json!({"_meta": {"progressToken": 9}}));
    }

    #[test]
    fn test_attach_rejects_positional_params() {
        let token = ProgressToken::Number(9);
        let err = RequestMeta::attach_progress_token(Some(json!([1, 2])), &token).unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::InvalidParams);
    }

    #[test]
    fn test_notification_shape() {
        let notification = ProgressNotification {
            progress_token: ProgressToken::from("abc"),
            progress: 50.0,
            total: Some(100.0),
            message: None,
        };
        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value, json!({"progressToken": "abc", "progress": 50.0, "total": 100.0}));
    }
}
