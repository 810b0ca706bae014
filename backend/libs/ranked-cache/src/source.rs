//! Authoritative store boundary used for rebuilds

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::CacheResult;
use crate::model::Link;
use crate::sort::SortMode;

/// Top-N query against the authoritative store.
#[derive(Debug, Clone, PartialEq)]
pub struct TopQuery {
    pub feed_id: Uuid,
    pub mode: SortMode,
    /// Only rows created at or after this instant.
    pub since: Option<DateTime<Utc>>,
    pub limit: usize,
}

/// Source of truth for links. Rows must come back ordered by `mode.order_by()`.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LinkSource: Send + Sync {
    async fn query_top_by_feed(&self, query: TopQuery) -> CacheResult<Vec<Link>>;
}
