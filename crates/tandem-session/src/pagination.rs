//! Cursor pagination
//!
//! Producers implement [`PageSource`]; the [`Paginator`] applies the N+1
//! lookahead and turns positions into signed cursors:
//!
//! ```text
//! page(cursor?, N) ── decode ──► fetch(after, N + 1)
//!                                   │
//!                 N + 1 items ◄─────┴─────► ≤ N items
//!                      │                        │
//!      emit N, cursor = encode(pos after N)   emit all, no cursor
//! ```
//!
//! Consumers stop when `nextCursor` is absent, never because a page is short.

use std::collections::HashSet;
use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::trace;

use tandem_protocol::{Cursor, CursorCodec, Error, Position, Result};

/// One item plus the position immediately after it
#[derive(Debug, Clone, PartialEq)]
pub struct Keyed<T> {
    /// The item itself
    pub item: T,
    /// Where the next page starts if this is the last item emitted
    pub position: Position,
}

impl<T> Keyed<T> {
    /// Pair an item with its position
    pub fn new(item: T, position: Position) -> Self {
        Self { item, position }
    }
}

/// Data source that can resume after a [`Position`]
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Item type produced by the source
    type Item: Send;

    /// Return up to `limit` items that come after `after` (or from the start).
    ///
    /// A position the source does not understand should fail with
    /// `InvalidCursor`.
    async fn fetch(&self, after: Option<&Position>, limit: usize)
    -> Result<Vec<Keyed<Self::Item>>>;
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items in this page
    pub items: Vec<T>,
    /// Cursor for the next page; absent when the sequence is exhausted
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

/// Applies page sizing and cursor signing on top of a [`PageSource`]
#[derive(Debug, Clone)]
pub struct Paginator {
    codec: CursorCodec,
    default_page_size: usize,
    max_page_size: usize,
}

impl Paginator {
    /// Paginator signing cursors with `codec`.
    ///
    /// `max_page_size` is raised to at least `default_page_size`.
    pub fn new(codec: CursorCodec, default_page_size: usize, max_page_size: usize) -> Self {
        let default_page_size = default_page_size.max(1);
        Self {
            codec,
            default_page_size,
            max_page_size: max_page_size.max(default_page_size),
        }
    }

    /// Same key and sizes, different cursor scope
    pub fn for_scope(&self, scope: impl Into<String>) -> Self {
        Self {
            codec: self.codec.for_scope(scope),
            ..self.clone()
        }
    }

    /// Cursor scope of this paginator
    pub fn scope(&self) -> &str {
        self.codec.scope()
    }

    /// Page size used when the caller does not ask for one
    pub fn default_page_size(&self) -> usize {
        self.default_page_size
    }

    /// Largest page size ever emitted
    pub fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    /// Produce the page starting at `cursor`.
    ///
    /// # Errors
    ///
    /// `InvalidParams` for a page size of zero, `InvalidCursor` for a cursor
    /// this paginator did not issue, and whatever the source returns.
    pub async fn page<S>(
        &self,
        source: &S,
        cursor: Option<&Cursor>,
        page_size: Option<usize>,
    ) -> Result<Page<S::Item>>
    where
        S: PageSource + ?Sized,
    {
        let limit = match page_size {
            Some(0) => return Err(Error::invalid_params("page size must be at least 1")),
            Some(size) => size.min(self.max_page_size),
            None => self.default_page_size,
        };

        let after = cursor.map(|c| self.codec.decode(c)).transpose()?;
        let mut fetched = source.fetch(after.as_ref(), limit.saturating_add(1)).await?;

        let next_cursor = if fetched.len() > limit {
            fetched.truncate(limit);
            let last = fetched
                .last()
                .ok_or_else(|| Error::internal("page truncated to zero items"))?;
            Some(self.codec.encode(&last.position)?)
        } else {
            None
        };

        trace!(
            scope = self.codec.scope(),
            items = fetched.len(),
            more = next_cursor.is_some(),
            "Produced page"
        );
        Ok(Page {
            items: fetched.into_iter().map(|keyed| keyed.item).collect(),
            next_cursor,
        })
    }
}

/// In-memory source over a fixed list, positioned by offset
#[derive(Debug, Clone)]
pub struct VecSource<T> {
    items: Vec<T>,
}

impl<T> VecSource<T> {
    /// Source over `items` in their current order
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the source is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl<T> PageSource for VecSource<T>
where
    T: Clone + Send + Sync,
{
    type Item = T;

    async fn fetch(&self, after: Option<&Position>, limit: usize) -> Result<Vec<Keyed<T>>> {
        let start = match after {
            None => 0,
            Some(Position::Offset { offset }) => usize::try_from(*offset)
                .map_err(|_| Error::invalid_cursor("offset out of range"))?,
            Some(_) => return Err(Error::invalid_cursor("expected an offset position")),
        };

        Ok(self
            .items
            .get(start..)
            .unwrap_or_default()
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, item)| Keyed::new(item.clone(), Position::offset((start + i + 1) as u64)))
            .collect())
    }
}

/// Follow `nextCursor` from the first page until it is absent.
///
/// # Errors
///
/// Fails with the first page error, or `InvalidCursor` if the producer hands
/// back a cursor it already issued in this walk.
pub async fn collect_all<T, F, Fut>(mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<Cursor>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor = None;

    loop {
        let page = fetch(cursor.take()).await?;
        items.extend(page.items);
        match page.next_cursor {
            Some(next) => {
                if !seen.insert(next.as_str().to_string()) {
                    return Err(Error::invalid_cursor("producer repeated a cursor"));
                }
                cursor = Some(next);
            }
            None => return Ok(items),
        }
    }
}
