//! Pagination types for list operations.

use serde::{Deserialize, Serialize};

/// A limit/offset window over a list endpoint.
///
/// Limits are clamped to `[1, MAX_LIMIT]`; offsets below zero cannot be
/// represented. Construct through [`PageRequest::new`] so the clamping is
/// applied in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Maximum number of items to return.
    pub limit: usize,
    /// Number of items to skip.
    pub offset: usize,
}

impl PageRequest {
    /// The default page limit.
    pub const DEFAULT_LIMIT: usize = 50;
    /// The maximum allowed page limit.
    pub const MAX_LIMIT: usize = 200;

    /// Creates a page request, clamping the limit into `[1, MAX_LIMIT]`.
    #[must_use]
    pub fn new(limit: usize, offset: usize) -> Self {
        Self {
            limit: limit.clamp(1, Self::MAX_LIMIT),
            offset,
        }
    }

    /// Creates a page request from optional query parameters.
    #[must_use]
    pub fn from_params(limit: Option<usize>, offset: Option<usize>) -> Self {
        Self::new(
            limit.unwrap_or(Self::DEFAULT_LIMIT),
            offset.unwrap_or(0),
        )
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT, 0)
    }
}

/// A page of results plus the total count across all pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// The items on this page.
    pub items: Vec<T>,
    /// Total number of items matching the query.
    pub total: u64,
    /// The limit that produced this page.
    pub limit: usize,
    /// The offset that produced this page.
    pub offset: usize,
}

impl<T> Page<T> {
    /// Creates a new page.
    #[must_use]
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            limit: request.limit,
            offset: request.offset,
        }
    }

    /// Maps the page items to a different type.
    #[must_use]
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            limit: self.limit,
            offset: self.offset,
        }
    }

    /// Returns true if the page has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the number of items on this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_clamped_to_max() {
        let req = PageRequest::new(1000, 0);
        assert_eq!(req.limit, PageRequest::MAX_LIMIT);
    }

    #[test]
    fn test_limit_clamped_to_min() {
        let req = PageRequest::new(0, 10);
        assert_eq!(req.limit, 1);
        assert_eq!(req.offset, 10);
    }

    #[test]
    fn test_from_params_defaults() {
        let req = PageRequest::from_params(None, None);
        assert_eq!(req.limit, PageRequest::DEFAULT_LIMIT);
        assert_eq!(req.offset, 0);
    }

    #[test]
    fn test_page_map() {
        let page = Page::new(vec![1, 2, 3], 3, PageRequest::default());
        let mapped = page.map(|x| x * 2);
        assert_eq!(mapped.items, vec![2, 4, 6]);
        assert_eq!(mapped.total, 3);
    }
}
