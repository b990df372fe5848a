//! Page/limit handling for list endpoints.

use serde::{Deserialize, Serialize};

/// Default page size.
pub const DEFAULT_LIMIT: u64 = 50;

/// Largest accepted page size.
pub const MAX_LIMIT: u64 = 1000;

/// Pagination block of a list response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// 1-based page number.
    pub page: u64,
    /// Page size.
    pub limit: u64,
    /// Total matching items.
    pub total: u64,
    /// Number of pages.
    pub total_pages: u64,
}

impl Pagination {
    /// Builds pagination from raw `page` and `limit` query values.
    ///
    /// Unparsable or missing values use the defaults. Pages below 1 become 1,
    /// limits below 1 become 50, and limits above 1000 become 1000.
    ///
    /// ```
    /// use api::pagination::Pagination;
    ///
    /// let p = Pagination::from_query(Some("3"), Some("5000"));
    /// assert_eq!((p.page, p.limit, p.offset()), (3, 1000, 2000));
    /// ```
    #[must_use]
    pub fn from_query(page: Option<&str>, limit: Option<&str>) -> Self {
        let page = page.and_then(|p| p.trim().parse::<i64>().ok()).unwrap_or(1);
        let limit = limit
            .and_then(|l| l.trim().parse::<i64>().ok())
            .unwrap_or(50);

        let page = u64::try_from(page).ok().filter(|p| *p >= 1).unwrap_or(1);
        let limit = match u64::try_from(limit) {
            Ok(0) | Err(_) => DEFAULT_LIMIT,
            Ok(l) => l.min(MAX_LIMIT),
        };

        Self {
            page,
            limit,
            total: 0,
            total_pages: 0,
        }
    }

    /// Number of items to skip.
    #[must_use]
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// Records the total and derives the page count.
    #[must_use]
    pub fn with_total(mut self, total: u64) -> Self {
        self.total = total;
        self.total_pages = total.div_ceil(self.limit);
        self
    }
}

/// A page of items with its pagination block.
#[derive(Debug, Serialize, Deserialize)]
pub struct Paginated<T> {
    /// The items.
    pub data: Vec<T>,
    /// Pagination details.
    pub pagination: Pagination,
}
