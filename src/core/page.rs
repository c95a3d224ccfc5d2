//! Cursor-paginated supplier output

use serde::{Deserialize, Serialize};

/// One page of items returned by a multi-item supplier
///
/// `next_cursor` is opaque to the engine; `None` marks the last page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPage<D> {
    pub items: Vec<D>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl<D> CursorPage<D> {
    pub fn new(items: Vec<D>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }

    /// A page with no successor
    pub fn last(items: Vec<D>) -> Self {
        Self::new(items, None)
    }

    pub fn empty() -> Self {
        Self::last(Vec::new())
    }

    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<D> Default for CursorPage<D> {
    fn default() -> Self {
        Self::empty()
    }
}
