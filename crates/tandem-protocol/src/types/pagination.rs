//! Pagination types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque pagination cursor
///
/// Holders must not interpret the contents. Only the
/// [`CursorCodec`](crate::CursorCodec) that issued a cursor can decode it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Wrap a raw cursor string received from a peer
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw cursor text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the raw cursor text
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Cursor {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for Cursor {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Common parameters of paginated list requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginatedRequestParams {
    /// Cursor returned by the previous page, absent for the first page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}
