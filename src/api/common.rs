//! Common API utilities and shared types

use serde::Deserialize;

use crate::models::ListParams;

/// Default page number (1-indexed)
pub fn default_page() -> u32 {
    1
}

/// Default page size for public listings
pub fn default_page_size() -> u32 {
    10
}

pub fn default_page_i64() -> i64 {
    1
}

/// Default page size for admin listings
pub fn default_per_page() -> i64 {
    20
}

/// Basic pagination query parameters
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub per_page: u32,
}

impl From<PaginationQuery> for ListParams {
    fn from(query: PaginationQuery) -> Self {
        ListParams::new(query.page, query.per_page)
    }
}

/// Admin pagination query parameters (uses i64)
#[derive(Debug, Deserialize)]
pub struct AdminPaginationQuery {
    #[serde(default = "default_page_i64")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

/// Creation context picked outside the form body
#[derive(Debug, Default, Deserialize)]
pub struct CreateContext {
    pub publisher_id: Option<i64>,
}
