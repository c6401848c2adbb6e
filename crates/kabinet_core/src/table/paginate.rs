//! Page-sized views over query results.

use crate::error::{CoreError, CoreResult};
use crate::table::results::QueryResults;

/// Page size used when a request does not name one.
pub const DEFAULT_PER_PAGE: u64 = 30;

/// Which page to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageRequest {
    page: Option<u64>,
    per_page: Option<u64>,
}

impl PageRequest {
    /// Requests `page`, counted from 1.
    #[must_use]
    pub const fn new(page: u64) -> Self {
        Self {
            page: Some(page),
            per_page: None,
        }
    }

    /// Sets the page size.
    #[must_use]
    pub const fn per_page(mut self, per_page: u64) -> Self {
        self.per_page = Some(per_page);
        self
    }

    /// Page number and size, with defaults applied.
    pub(crate) fn resolve(self) -> CoreResult<(u64, u64)> {
        let page = self.page.unwrap_or(1);
        if page == 0 {
            return Err(CoreError::query("page must be at least 1"));
        }
        let per_page = self.per_page.unwrap_or(DEFAULT_PER_PAGE);
        if per_page == 0 {
            return Err(CoreError::query("per_page must be at least 1"));
        }
        Ok((page, per_page))
    }
}

/// One page of results plus the numbers needed to navigate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// The records on this page.
    pub results: QueryResults,
    /// Page number, counted from 1.
    pub current_page: u64,
    /// Page size.
    pub per_page: u64,
    /// Records matched across every page.
    pub total_entries: u64,
    /// Number of pages holding records.
    pub total_pages: u64,
}

impl Page {
    pub(crate) fn new(results: QueryResults, current_page: u64, per_page: u64, total_entries: u64) -> Self {
        Self {
            results,
            current_page,
            per_page,
            total_entries,
            total_pages: total_entries.div_ceil(per_page),
        }
    }

    /// Records skipped before this page.
    pub const fn offset(&self) -> u64 {
        (self.current_page - 1) * self.per_page
    }

    /// Returns true for a page past the last one.
    pub const fn out_of_bounds(&self) -> bool {
        self.current_page > self.total_pages
    }

    /// The page before this one, if any.
    pub const fn previous_page(&self) -> Option<u64> {
        if self.current_page > 1 {
            Some(self.current_page - 1)
        } else {
            None
        }
    }

    /// The page after this one, if it holds records.
    pub const fn next_page(&self) -> Option<u64> {
        if self.current_page < self.total_pages {
            Some(self.current_page + 1)
        } else {
            None
        }
    }

    /// Returns the number of records on this page.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns true if the page holds no records.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(current: u64, per_page: u64, total: u64) -> Page {
        Page::new(QueryResults::Keys(Vec::new()), current, per_page, total)
    }

    #[test]
    fn requests_default_and_validate() {
        assert_eq!(PageRequest::default().resolve().unwrap(), (1, DEFAULT_PER_PAGE));
        assert_eq!(PageRequest::new(3).per_page(2).resolve().unwrap(), (3, 2));
        assert!(matches!(PageRequest::new(0).resolve(), Err(CoreError::Query(_))));
        assert!(matches!(PageRequest::new(1).per_page(0).resolve(), Err(CoreError::Query(_))));
    }

    #[test]
    fn navigation() {
        let first = page(1, 2, 3);
        assert_eq!(first.total_pages, 2);
        assert_eq!(first.offset(), 0);
        assert_eq!((first.previous_page(), first.next_page()), (None, Some(2)));

        let last = page(2, 2, 3);
        assert_eq!((last.previous_page(), last.next_page()), (Some(1), None));
        assert!(!last.out_of_bounds());

        let past = page(3, 2, 3);
        assert!(past.out_of_bounds());
        assert_eq!(past.offset(), 4);
        assert_eq!(past.previous_page(), Some(2));

        assert_eq!(page(1, 30, 0).total_pages, 0);
    }
}
