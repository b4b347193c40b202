//! Offset pagination for list queries.

use serde::{Deserialize, Serialize};

/// Default number of items returned by a list query.
pub const DEFAULT_PAGE_LIMIT: u64 = 100;

/// Upper bound on the page size a caller may request.
pub const MAX_PAGE_LIMIT: u64 = 1000;

/// Requested page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Number of matching items to skip.
    #[serde(default)]
    pub offset: u64,
    /// Maximum number of items to return (0 = default).
    #[serde(default)]
    pub limit: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// Page metadata returned alongside the items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResponse {
    /// Total number of matching items, ignoring pagination.
    pub total: u64,
}

impl PageRequest {
    /// Effective limit after applying the default and the cap.
    pub fn effective_limit(&self) -> u64 {
        match self.limit {
            0 => DEFAULT_PAGE_LIMIT,
            n => n.min(MAX_PAGE_LIMIT),
        }
    }

    /// Slices an already filtered, ordered list.
    pub fn apply<T>(&self, items: Vec<T>) -> (Vec<T>, PageResponse) {
        let total = items.len() as u64;
        let page = items
            .into_iter()
            .skip(usize::try_from(self.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(self.effective_limit()).unwrap_or(usize::MAX))
            .collect();
        (page, PageResponse { total })
    }
}
