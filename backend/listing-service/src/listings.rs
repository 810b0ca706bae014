//! Listing service: ranked ids from the cache, hydrated into links

use std::sync::Arc;

use ranked_cache::{CrossFeedAggregator, Link, RankedCache, SortMode, TimeWindow};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::links::LinkCache;

pub const DEFAULT_PAGE_SIZE: usize = 25;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Page {
    pub fn new(offset: Option<usize>, limit: Option<usize>) -> Self {
        Self {
            offset: offset.unwrap_or(0),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = self.offset.min(items.len());
        let end = start.saturating_add(self.limit).min(items.len());
        &items[start..end]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub sort: SortMode,
    pub window: TimeWindow,
    pub offset: usize,
    /// Ranked entries available before paging.
    pub total: usize,
    pub links: Vec<Link>,
}

#[derive(Clone)]
pub struct ListingService {
    cache: RankedCache,
    aggregator: CrossFeedAggregator,
    links: Arc<LinkCache>,
    strict_sort_modes: bool,
}

impl ListingService {
    pub fn new(cache: RankedCache, links: Arc<LinkCache>, strict_sort_modes: bool) -> Self {
        Self {
            aggregator: CrossFeedAggregator::new(cache.clone()),
            cache,
            links,
            strict_sort_modes,
        }
    }

    pub fn links(&self) -> &Arc<LinkCache> {
        &self.links
    }

    /// Resolve a sort name from a request.
    pub fn parse_sort(&self, name: &str) -> Result<SortMode> {
        if self.strict_sort_modes {
            Ok(name.parse::<SortMode>()?)
        } else {
            Ok(SortMode::from_name_lenient(name))
        }
    }

    pub fn parse_window(&self, name: Option<&str>) -> Result<TimeWindow> {
        match name {
            None | Some("") => Ok(TimeWindow::All),
            Some(name) => name
                .parse()
                .map_err(|_| AppError::BadRequest(format!("unknown time window: {}", name))),
        }
    }

    #[instrument(skip(self))]
    pub async fn feed_listing(
        &self,
        feed_id: Uuid,
        sort: SortMode,
        window: TimeWindow,
        page: Page,
    ) -> Result<Listing> {
        let window = sort.window_or_all(window);
        let ids = self.cache.query(feed_id, sort, window).fetch_ids().await?;
        self.hydrate(sort, window, &ids, page).await
    }

    #[instrument(skip(self, feed_ids), fields(feeds = feed_ids.len()))]
    pub async fn front_page(
        &self,
        feed_ids: &[Uuid],
        sort: SortMode,
        window: TimeWindow,
        page: Page,
    ) -> Result<Listing> {
        if feed_ids.is_empty() {
            return Err(AppError::BadRequest("at least one feed is required".into()));
        }
        let window = sort.window_or_all(window);
        let ids = self.aggregator.top_ids(feed_ids, sort, window).await?;
        self.hydrate(sort, window, &ids, page).await
    }

    async fn hydrate(
        &self,
        sort: SortMode,
        window: TimeWindow,
        ids: &[Uuid],
        page: Page,
    ) -> Result<Listing> {
        let links = self.links.by_ids(page.slice(ids)).await?;
        Ok(Listing {
            sort,
            window,
            offset: page.offset,
            total: ids.len(),
            links,
        })
    }
}
