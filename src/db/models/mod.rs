use serde::{Deserialize, Serialize};

pub mod leaderboard;
pub mod solve;
pub mod user;

#[inline]
const fn default_page() -> i64 {
    0
}

#[inline]
const fn default_limit() -> i64 {
    50
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default = "default_page")]
    pub page: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            page: default_page(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub total_items: i64,
    pub total_pages: i64,
    #[serde(default = "default_limit")]
    pub page_size: i64,
}

impl<T> PaginatedResponse<T> {
    /// Slices an already-ordered collection into the requested page.
    pub fn from_all(all: Vec<T>, pagination: &Pagination) -> Self {
        let page_size = pagination.limit.clamp(1, 500);
        let page = pagination.page.max(0);
        let total_items = all.len() as i64;
        let total_pages = (total_items + page_size - 1) / page_size;

        // pages past the end are empty, however large the requested index
        let skip = usize::try_from(page.saturating_mul(page_size)).unwrap_or(usize::MAX);
        let items = all
            .into_iter()
            .skip(skip)
            .take(page_size as usize)
            .collect();

        Self {
            items,
            page,
            page_size,
            total_items,
            total_pages,
        }
    }
}
