//! Signed, versioned pagination cursors.
//!
//! A cursor is opaque to the holder but self-describing to its issuer:
//!
//! ```text
//! base64url(envelope_json) "." base64url(hmac_sha256(key, envelope_json))
//! ```
//!
//! The envelope records a format version, the scope (which list the cursor
//! belongs to), the [`Position`] to resume after and the issue time. Because
//! everything needed to resume lives in the cursor itself, cursors survive a
//! restart as long as the key does. A cursor from another scope, another
//! version, or with any altered byte decodes to `InvalidCursor`, never to a
//! default position.
//!
//! ```rust
//! use tandem_protocol::{CursorCodec, ErrorKind, Position};
//!
//! let codec = CursorCodec::new("resources/list", b"0123456789abcdef0123456789abcdef".to_vec()).unwrap();
//! let cursor = codec.encode(&Position::offset(100)).unwrap();
//! assert_eq!(codec.decode(&cursor).unwrap(), Position::offset(100));
//!
//! let other = CursorCodec::new("prompts/list", b"0123456789abcdef0123456789abcdef".to_vec()).unwrap();
//! assert_eq!(other.decode(&cursor).unwrap_err().kind, ErrorKind::InvalidCursor);
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::Cursor;

type HmacSha256 = Hmac<Sha256>;

/// Current cursor envelope format
pub const CURSOR_VERSION: u32 = 1;

/// Shortest signing key accepted
pub const MIN_KEY_LEN: usize = 16;

const SEPARATOR: char = '.';

/// Where the next page starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "k", rename_all = "snake_case")]
pub enum Position {
    /// Number of items already returned
    Offset {
        /// Items to skip
        offset: u64,
    },
    /// Last item returned, by sort key plus a unique tie-breaker
    Keyset {
        /// Sort key of the last returned item
        sort_key: Value,
        /// Unique identifier breaking ties between equal sort keys
        tie_break: String,
    },
    /// Continuation token of an upstream provider
    Provider {
        /// Provider-issued token
        token: String,
    },
}

impl Position {
    /// Offset position
    #[must_use]
    pub fn offset(offset: u64) -> Self {
        Self::Offset { offset }
    }

    /// Keyset position
    pub fn keyset(sort_key: impl Into<Value>, tie_break: impl Into<String>) -> Self {
        Self::Keyset {
            sort_key: sort_key.into(),
            tie_break: tie_break.into(),
        }
    }

    /// Provider token position
    pub fn provider(token: impl Into<String>) -> Self {
        Self::Provider {
            token: token.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    v: u32,
    s: String,
    p: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    t: Option<i64>,
}

/// Encodes and validates cursors for one scope
#[derive(Clone)]
pub struct CursorCodec {
    scope: String,
    key: Vec<u8>,
    max_age: Option<Duration>,
}

impl fmt::Debug for CursorCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorCodec")
            .field("scope", &self.scope)
            .field("key", &"<redacted>")
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl CursorCodec {
    /// Create a codec for `scope` signing with `key`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` when the key is shorter than [`MIN_KEY_LEN`].
    pub fn new(scope: impl Into<String>, key: impl Into<Vec<u8>>) -> Result<Self> {
        let key = key.into();
        if key.len() < MIN_KEY_LEN {
            return Err(Error::configuration(format!(
                "cursor key must be at least {MIN_KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        Ok(Self {
            scope: scope.into(),
            key,
            max_age: None,
        })
    }

    /// Codec with a random per-process key. Cursors do not survive a restart.
    pub fn ephemeral(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            key: rand::random::<[u8; 32]>().to_vec(),
            max_age: None,
        }
    }

    /// Reject cursors issued longer than `max_age` ago
    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Same key and age limit, different scope
    #[must_use]
    pub fn for_scope(&self, scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            key: self.key.clone(),
            max_age: self.max_age,
        }
    }

    /// The scope this codec issues and accepts
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|e| Error::internal(format!("hmac key rejected: {e}")))
    }

    /// Encode `position` as an opaque cursor
    pub fn encode(&self, position: &Position) -> Result<Cursor> {
        let envelope = Envelope {
            v: CURSOR_VERSION,
            s: self.scope.clone(),
            p: position.clone(),
            t: Some(chrono::Utc::now().timestamp()),
        };
        let body = serde_json::to_vec(&envelope)
            .map_err(|e| Error::serialization(format!("cursor envelope: {e}")))?;

        let mut mac = self.mac()?;
        mac.update(&body);
        let tag = mac.finalize().into_bytes();

        Ok(Cursor::new(format!(
            "{}{SEPARATOR}{}",
            URL_SAFE_NO_PAD.encode(&body),
            URL_SAFE_NO_PAD.encode(tag)
        )))
    }

    /// Decode a cursor issued by this codec.
    ///
    /// # Errors
    ///
    /// Every failure is `InvalidCursor`: malformed text, a bad signature, an
    /// unknown version, a different scope, or an expired issue time.
    pub fn decode(&self, cursor: &Cursor) -> Result<Position> {
        let (body_b64, tag_b64) = cursor
            .as_str()
            .split_once(SEPARATOR)
            .ok_or_else(|| Error::invalid_cursor("cursor is malformed"))?;

        let body = URL_SAFE_NO_PAD
            .decode(body_b64)
            .map_err(|_| Error::invalid_cursor("cursor is not valid base64"))?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|_| Error::invalid_cursor("cursor is not valid base64"))?;

        let mut mac = self.mac()?;
        mac.update(&body);
        mac.verify_slice(&tag)
            .map_err(|_| Error::invalid_cursor("cursor signature mismatch"))?;

        let raw: Value = serde_json::from_slice(&body)
            .map_err(|_| Error::invalid_cursor("cursor body is not JSON"))?;
        match raw.get("v").and_then(Value::as_u64) {
            Some(v) if v == u64::from(CURSOR_VERSION) => {}
            Some(v) => {
                return Err(Error::invalid_cursor(format!(
                    "unsupported cursor version {v}"
                )));
            }
            None => return Err(Error::invalid_cursor("cursor has no version")),
        }

        let envelope: Envelope = serde_json::from_value(raw)
            .map_err(|_| Error::invalid_cursor("cursor body is malformed"))?;

        if envelope.s != self.scope {
            return Err(Error::invalid_cursor(format!(
                "cursor belongs to '{}', not '{}'",
                envelope.s, self.scope
            )));
        }

        if let Some(max_age) = self.max_age {
            let issued = envelope
                .t
                .ok_or_else(|| Error::invalid_cursor("cursor has no issue time"))?;
            let age = chrono::Utc::now().timestamp().saturating_sub(issued);
            let limit = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
            if age > limit {
                return Err(Error::invalid_cursor("cursor has expired"));
            }
        }

        Ok(envelope.p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use serde_json::json;

    const KEY: &[u8] = b"an-example-signing-key-of-32-byt";

    fn codec(scope: &str) -> CursorCodec {
        CursorCodec::new(scope, KEY.to_vec()).unwrap()
    }

    fn sign(body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(KEY).unwrap();
        mac.update(body);
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(body),
            URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
        )
    }

    #[test]
    fn test_positions_survive_a_new_codec() {
        let positions = [
            Position::offset(250),
            Position::keyset(json!("2024-01-01"), "row-17"),
            Position::provider("upstream-token"),
        ];
        for position in positions {
            let cursor = codec("items").encode(&position).unwrap();
            assert_eq!(codec("items").decode(&cursor).unwrap(), position);
        }
    }

    #[test]
    fn test_short_key_rejected() {
        let err = CursorCodec::new("items", b"short".to_vec()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[test]
    fn test_other_key_rejected() {
        let cursor = codec("items").encode(&Position::offset(1)).unwrap();
        let other = CursorCodec::new("items", b"a-different-signing-key-32-bytes".to_vec()).unwrap();
        assert_eq!(other.decode(&cursor).unwrap_err().kind, ErrorKind::InvalidCursor);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let body = serde_json::to_vec(&json!({
            "v": 2, "s": "items", "p": {"k": "offset", "offset": 5}
        }))
        .unwrap();
        let err = codec("items").decode(&Cursor::new(sign(&body))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidCursor);
        assert!(err.message.contains("version"));
    }

    #[test]
    fn test_garbage_rejected() {
        for raw in ["", "no-separator", "!!!.???", "e30.e30"] {
            let err = codec("items").decode(&Cursor::new(raw)).unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidCursor, "input {raw:?}");
            assert_eq!(err.data.as_ref().unwrap()["reason"], "invalid_cursor");
        }
    }

    #[test]
    fn test_expired_cursor_rejected() {
        let body = serde_json::to_vec(&json!({
            "v": 1, "s": "items", "p": {"k": "offset", "offset": 5},
            "t": chrono::Utc::now().timestamp() - 3_600
        }))
        .unwrap();
        let cursor = Cursor::new(sign(&body));

        assert_eq!(codec("items").decode(&cursor).unwrap(), Position::offset(5));

        let strict = codec("items").with_max_age(Duration::from_secs(60));
        assert_eq!(strict.decode(&cursor).unwrap_err().kind, ErrorKind::InvalidCursor);
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", codec("items"));
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("signing-key"));
    }

    #[test]
    fn test_for_scope_shares_key() {
        let items = codec("items");
        let prompts = items.for_scope("prompts");
        let cursor = prompts.encode(&Position::offset(3)).unwrap();
        assert_eq!(prompts.decode(&cursor).unwrap(), Position::offset(3));
        assert!(items.decode(&cursor).is_err());
    }
}
