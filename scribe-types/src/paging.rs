//! Cursor paging for multi-page fetches.
//!
//! Storage queries return one [`Paged`] result at a time; callers that need
//! the whole set walk the cursor with [`collect_all_pages`], which checks an
//! [`AbortHandle`] between pages. An aborted walk is a hard error, never a
//! silently truncated result.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Opaque position in a paged result set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageCursor(String);

impl PageCursor {
    /// Wraps a producer-defined cursor token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw cursor token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page of results plus the cursor to the next page, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paged<T> {
    /// The items on this page.
    pub items: Vec<T>,

    /// Cursor to the next page; `None` on the last page.
    pub next_cursor: Option<PageCursor>,
}

impl<T> Paged<T> {
    /// A terminal page with no successor.
    #[must_use]
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }

    /// A page pointing at a successor.
    #[must_use]
    pub fn with_next(items: Vec<T>, next_cursor: PageCursor) -> Self {
        Self {
            items,
            next_cursor: Some(next_cursor),
        }
    }
}

/// Cooperative cancellation shared between a caller and a paged walk.
///
/// Cloning yields another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    /// Creates a handle that has not been aborted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    /// True once [`abort`](Self::abort) has been called on any clone.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

/// How a paged walk failed.
#[derive(Debug, thiserror::Error)]
pub enum PagingError<E>
where
    E: std::error::Error,
{
    /// The abort handle fired between pages.
    #[error("pagination aborted")]
    Aborted,

    /// A page fetch failed.
    #[error(transparent)]
    Fetch(#[from] E),
}

/// Walks every page of a cursor-paged fetch and concatenates the items.
///
/// The abort handle is checked before each fetch, including the first; an
/// abort observed mid-walk discards everything collected so far and returns
/// [`PagingError::Aborted`].
pub async fn collect_all_pages<T, E, F, Fut>(
    mut fetch: F,
    abort: &AbortHandle,
) -> Result<Vec<T>, PagingError<E>>
where
    E: std::error::Error,
    F: FnMut(Option<PageCursor>) -> Fut,
    Fut: Future<Output = Result<Paged<T>, E>>,
{
    let mut items = Vec::new();
    let mut cursor = None;

    loop {
        if abort.is_aborted() {
            return Err(PagingError::Aborted);
        }

        let page = fetch(cursor).await?;
        items.extend(page.items);

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => return Ok(items),
        }
    }
}
