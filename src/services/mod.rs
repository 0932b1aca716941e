pub mod catalog;
pub mod dashboard;
pub mod movements;
pub mod stock_read;
pub mod valuation;

use serde::Serialize;
use utoipa::ToSchema;

/// One page of a reverse-chronological or otherwise ordered listing
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: u64, page_size: u64, total: u64) -> Self {
        let total_pages = if total == 0 || page_size == 0 {
            0
        } else {
            (total + page_size - 1) / page_size
        };
        Self {
            items,
            page,
            page_size,
            total,
            total_pages,
        }
    }
}

/// Resolves a requested page and page size against configured defaults and limits
pub(crate) fn resolve_paging(
    page: Option<u64>,
    page_size: Option<u64>,
    default_size: u64,
    max_size: u64,
) -> (u64, u64) {
    let page = page.filter(|p| *p > 0).unwrap_or(1);
    let size = page_size
        .filter(|s| *s > 0)
        .unwrap_or(default_size)
        .min(max_size);
    (page, size)
}
