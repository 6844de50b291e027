//! Pagination utilities for summary listings

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    /// Rows per page after capping
    pub page_size: i64,
    /// Total number of pages
    pub total_pages: i64,
    /// Offset into the filtered result set
    pub offset: i64,
}

/// Calculate pagination metadata from total results and requested page
///
/// The page size is clamped to `[1, page_cap]` and the page to
/// `[1, total_pages]`, so out-of-range requests land on the last page.
///
/// # Examples
/// ```
/// use acred_engine::pagination::calculate_pagination;
///
/// // 25 results at 10 per page = 3 pages (10 + 10 + 5)
/// let p = calculate_pagination(25, 2, 10, 50);
/// assert_eq!(p.page, 2);
/// assert_eq!(p.total_pages, 3);
/// assert_eq!(p.offset, 10);
///
/// // Requesting out-of-bounds page gets clamped
/// let p = calculate_pagination(25, 99, 10, 50);
/// assert_eq!(p.page, 3);
/// assert_eq!(p.offset, 20);
/// ```
pub fn calculate_pagination(
    total_results: i64,
    requested_page: i64,
    requested_page_size: i64,
    page_cap: i64,
) -> Pagination {
    let page_size = requested_page_size.max(1).min(page_cap.max(1));
    let total_pages = (total_results + page_size - 1) / page_size;
    let page = requested_page.max(1).min(total_pages.max(1));
    let offset = (page - 1) * page_size;

    Pagination {
        page,
        page_size,
        total_pages,
        offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_normal() {
        let p = calculate_pagination(250, 2, 100, 100);
        assert_eq!(p.page, 2);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.offset, 100);
    }

    #[test]
    fn test_pagination_out_of_bounds_high() {
        let p = calculate_pagination(150, 99, 100, 100);
        assert_eq!(p.page, 2); // Clamped to last page
        assert_eq!(p.offset, 100);
    }

    #[test]
    fn test_pagination_out_of_bounds_low() {
        let p = calculate_pagination(150, 0, 100, 100);
        assert_eq!(p.page, 1);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_pagination_empty() {
        let p = calculate_pagination(0, 1, 20, 50);
        assert_eq!(p.page, 1);
        assert_eq!(p.total_pages, 0);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_page_size_capped() {
        let p = calculate_pagination(120, 1, 500, 50);
        assert_eq!(p.page_size, 50);
        assert_eq!(p.total_pages, 3);

        let p = calculate_pagination(120, 1, 0, 50);
        assert_eq!(p.page_size, 1);
    }
}
