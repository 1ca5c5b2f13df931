//! Page requests and page results.

use bazaar_common::{AppError, AppResult};
use serde::{Deserialize, Serialize};

const DEFAULT_LIMIT: u64 = 20;

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: u64,
    /// Items per page.
    pub limit: u64,
    /// Compute the exact total even past the first page.
    #[serde(default)]
    pub include_total: bool,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_LIMIT)
    }
}

impl PageRequest {
    /// Page `page` of `limit` items.
    #[must_use]
    pub const fn new(page: u64, limit: u64) -> Self {
        Self {
            page,
            limit,
            include_total: false,
        }
    }

    /// Ask for the total on every page, not just the first.
    #[must_use]
    pub const fn with_total(mut self) -> Self {
        self.include_total = true;
        self
    }

    /// The next page with the same size.
    #[must_use]
    pub const fn next(self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            ..self
        }
    }

    /// Whether a read should count the full result set.
    #[must_use]
    pub const fn wants_total(&self) -> bool {
        self.page == 1 || self.include_total
    }

    /// Validate against `max_limit` and return `(offset, limit)`.
    ///
    /// Out-of-range values are rejected, never clamped.
    pub fn bounds(&self, max_limit: u64) -> AppResult<(u64, u64)> {
        if self.page == 0 {
            return Err(AppError::BadRequest("page starts at 1".to_string()));
        }
        if self.limit == 0 || self.limit > max_limit {
            return Err(AppError::BadRequest(format!(
                "limit must be between 1 and {max_limit}"
            )));
        }

        let offset = (self.page - 1)
            .checked_mul(self.limit)
            .ok_or_else(|| AppError::BadRequest("page out of range".to_string()))?;
        Ok((offset, self.limit))
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// 1-based page number.
    pub page: u64,
    /// Requested page size.
    pub limit: u64,
    /// A full page came back, so there may be more.
    pub has_more: bool,
    /// Exact match count, when it was computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl<T> Page<T> {
    /// Build a page from the fetched `items`.
    #[must_use]
    pub fn new(items: Vec<T>, request: &PageRequest, total: Option<u64>) -> Self {
        let has_more = items.len() as u64 == request.limit;
        Self {
            items,
            page: request.page,
            limit: request.limit,
            has_more,
            total,
        }
    }

    /// Transform the items, keeping the page metadata.
    #[must_use]
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            limit: self.limit,
            has_more: self.has_more,
            total: self.total,
        }
    }

    /// Number of items on this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether this page is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        assert_eq!(PageRequest::new(1, 10).bounds(100).unwrap(), (0, 10));
        assert_eq!(PageRequest::new(3, 25).bounds(100).unwrap(), (50, 25));
    }

    #[test]
    fn test_invalid_requests_are_rejected() {
        assert!(matches!(
            PageRequest::new(0, 10).bounds(100),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            PageRequest::new(1, 0).bounds(100),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            PageRequest::new(1, 101).bounds(100),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            PageRequest::new(u64::MAX, 100).bounds(100),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_total_only_on_first_page_unless_asked() {
        assert!(PageRequest::new(1, 10).wants_total());
        assert!(!PageRequest::new(2, 10).wants_total());
        assert!(PageRequest::new(2, 10).with_total().wants_total());
    }

    #[test]
    fn test_has_more_means_full_page() {
        let req = PageRequest::new(1, 2);
        assert!(Page::new(vec![1, 2], &req, None).has_more);
        assert!(!Page::new(vec![1], &req, Some(1)).has_more);
    }

    #[test]
    fn test_map_keeps_metadata() {
        let page = Page::new(vec![1, 2], &PageRequest::new(2, 2), Some(10)).map(|n| n * 10);
        assert_eq!(page.items, vec![10, 20]);
        assert_eq!(page.page, 2);
        assert_eq!(page.total, Some(10));
        assert!(page.has_more);
        assert_eq!(page.len(), 2);
    }
}
