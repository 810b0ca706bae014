//! Per-(feed, sort, window) ranked list queries
//!
//! A [`FeedRankedQuery`] is a transient view over one cached list. Reads take
//! no lock and see whole snapshots. Mutations run under the key's lock and
//! write the full list back in a single `set`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::CacheResult;
use crate::keys::CacheKey;
use crate::metrics::CacheMetrics;
use crate::model::Link;
use crate::ranked_list::{apply_insert, remove_ids, sort_descending};
use crate::sort::{RankedEntry, SortMode};
use crate::source::{LinkSource, TopQuery};
use crate::store::{self, LockOptions, RankedCacheStore};
use crate::window::TimeWindow;
use crate::PRECOMPUTE_LIMIT;

/// Bump when the layout of [`CachedRankedList`] changes.
pub const LIST_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct RankedCacheConfig {
    pub precompute_limit: usize,
    pub lock: LockOptions,
}

impl Default for RankedCacheConfig {
    fn default() -> Self {
        Self {
            precompute_limit: PRECOMPUTE_LIMIT,
            lock: LockOptions::default(),
        }
    }
}

/// Stored value for one ranked list key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRankedList {
    pub entries: Vec<RankedEntry>,
    pub built_at: DateTime<Utc>,
    pub schema_version: u32,
}

impl CachedRankedList {
    pub fn new(entries: Vec<RankedEntry>) -> Self {
        Self {
            entries,
            built_at: Utc::now(),
            schema_version: LIST_SCHEMA_VERSION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Nothing was admitted; the stored list was left as is.
    Unchanged,
    Updated { len: usize },
}

/// Read-time predicate. Never changes what is stored.
pub type EntryFilter = Arc<dyn Fn(&RankedEntry) -> bool + Send + Sync>;

/// Shared handle to the cache store and the authoritative source.
#[derive(Clone)]
pub struct RankedCache {
    store: Arc<dyn RankedCacheStore>,
    source: Arc<dyn LinkSource>,
    config: RankedCacheConfig,
    metrics: CacheMetrics,
}

impl RankedCache {
    pub fn new(
        store: Arc<dyn RankedCacheStore>,
        source: Arc<dyn LinkSource>,
        config: RankedCacheConfig,
    ) -> Self {
        Self {
            store,
            source,
            config,
            metrics: CacheMetrics::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn RankedCacheStore> {
        &self.store
    }

    pub fn config(&self) -> &RankedCacheConfig {
        &self.config
    }

    pub fn query(&self, feed_id: Uuid, mode: SortMode, window: TimeWindow) -> FeedRankedQuery {
        FeedRankedQuery {
            cache: self.clone(),
            key: CacheKey::ranked_list(feed_id, mode, window),
            feed_id,
            mode,
            window,
            filters: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct FeedRankedQuery {
    cache: RankedCache,
    key: String,
    feed_id: Uuid,
    mode: SortMode,
    window: TimeWindow,
    filters: Vec<EntryFilter>,
}

impl FeedRankedQuery {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn feed_id(&self) -> Uuid {
        self.feed_id
    }

    pub fn mode(&self) -> SortMode {
        self.mode
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    /// Add a read-time predicate. Entries failing any filter are skipped by `fetch`.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&RankedEntry) -> bool + Send + Sync + 'static,
    {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Current list for the key, rebuilt from the source on miss.
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn fetch(&self) -> CacheResult<Vec<RankedEntry>> {
        let (entries, hit) = self.load_or_rebuild().await?;
        let sort = self.mode.as_str();
        if hit {
            self.cache.metrics.record_hit(sort);
        } else {
            self.cache.metrics.record_miss(sort);
        }
        let now = Utc::now();
        Ok(entries
            .into_iter()
            .filter(|e| self.in_window(e, now))
            .filter(|e| self.filters.iter().all(|f| f(e)))
            .collect())
    }

    pub async fn fetch_ids(&self) -> CacheResult<Vec<Uuid>> {
        Ok(self.fetch().await?.into_iter().map(|e| e.id).collect())
    }

    /// Insert or update `links` in the cached list.
    ///
    /// Links outside this query's window are ignored.
    #[instrument(skip(self, links), fields(key = %self.key, count = links.len()))]
    pub async fn insert(&self, links: &[Link]) -> CacheResult<InsertOutcome> {
        let now = Utc::now();
        let incoming: Vec<RankedEntry> = links
            .iter()
            .map(|link| self.mode.entry(link))
            .filter(|e| self.in_window(e, now))
            .collect();
        if incoming.is_empty() {
            return Ok(InsertOutcome::Unchanged);
        }

        let lock_key = CacheKey::lock(&self.key);
        store::with_lock(
            self.cache.store.as_ref(),
            &lock_key,
            &self.cache.config.lock,
            move || self.insert_locked(incoming),
        )
        .await
    }

    /// Remove `ids` from the cached list. Returns how many entries were removed.
    ///
    /// A cold key stays cold: this never rebuilds.
    #[instrument(skip(self, ids), fields(key = %self.key, count = ids.len()))]
    pub async fn delete(&self, ids: &[Uuid]) -> CacheResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids: HashSet<Uuid> = ids.iter().copied().collect();

        let lock_key = CacheKey::lock(&self.key);
        store::with_lock(
            self.cache.store.as_ref(),
            &lock_key,
            &self.cache.config.lock,
            move || self.delete_locked(ids),
        )
        .await
    }

    /// Drop the cached value so the next fetch rebuilds.
    pub async fn invalidate(&self) -> CacheResult<()> {
        self.cache.store.delete(&self.key).await
    }

    async fn insert_locked(&self, incoming: Vec<RankedEntry>) -> CacheResult<InsertOutcome> {
        let (mut current, _) = self.load_or_rebuild().await?;
        // Aged-out entries must not hold slots or set the admission floor.
        let now = Utc::now();
        let before = current.len();
        current.retain(|e| self.in_window(e, now));
        let expired = before - current.len();

        match apply_insert(&current, &incoming, self.cache.config.precompute_limit) {
            None if expired == 0 => {
                debug!(key = %self.key, "Insert admitted nothing");
                Ok(InsertOutcome::Unchanged)
            }
            None => {
                let len = current.len();
                debug!(
                    key = %self.key,
                    expired,
                    "Insert admitted nothing, dropped expired entries"
                );
                self.persist(current).await?;
                Ok(InsertOutcome::Updated { len })
            }
            Some(updated) => {
                let len = updated.len();
                self.persist(updated).await?;
                Ok(InsertOutcome::Updated { len })
            }
        }
    }

    async fn delete_locked(&self, ids: HashSet<Uuid>) -> CacheResult<usize> {
        let Some(mut entries) = self.load_cached().await? else {
            return Ok(0);
        };
        let removed = remove_ids(&mut entries, &ids);
        if removed > 0 {
            self.persist(entries).await?;
        }
        Ok(removed)
    }

    fn in_window(&self, entry: &RankedEntry, now: DateTime<Utc>) -> bool {
        match entry.key.created_us() {
            Some(created_us) => self.window.contains(created_us, now),
            None => true,
        }
    }

    /// Cached entries, or a fresh rebuild. The flag is true when the cache answered.
    async fn load_or_rebuild(&self) -> CacheResult<(Vec<RankedEntry>, bool)> {
        match self.load_cached().await? {
            Some(entries) => Ok((entries, true)),
            None => Ok((self.rebuild().await?, false)),
        }
    }

    /// Raw cached entries. Undecodable or outdated values are dropped and read as a miss.
    async fn load_cached(&self) -> CacheResult<Option<Vec<RankedEntry>>> {
        let Some(raw) = self.cache.store.get(&self.key).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<CachedRankedList>(&raw) {
            Ok(list) if list.schema_version == LIST_SCHEMA_VERSION => Ok(Some(list.entries)),
            Ok(list) => {
                info!(
                    key = %self.key,
                    found = list.schema_version,
                    expected = LIST_SCHEMA_VERSION,
                    "Discarding cached list with old schema"
                );
                self.cache.store.delete(&self.key).await?;
                Ok(None)
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Discarding undecodable cached list");
                self.cache.store.delete(&self.key).await?;
                Ok(None)
            }
        }
    }

    async fn rebuild(&self) -> CacheResult<Vec<RankedEntry>> {
        let limit = self.cache.config.precompute_limit;
        let rows = self
            .cache
            .source
            .query_top_by_feed(TopQuery {
                feed_id: self.feed_id,
                mode: self.mode,
                since: self.window.since(Utc::now()),
                limit,
            })
            .await?;

        let mut entries: Vec<RankedEntry> = rows.iter().map(|link| self.mode.entry(link)).collect();
        // Rows already arrive in order; the stable sort only guards the bound.
        sort_descending(&mut entries);
        entries.truncate(limit);

        self.persist(entries.clone()).await?;
        self.cache.metrics.record_rebuild(self.mode.as_str());
        debug!(key = %self.key, len = entries.len(), "Ranked list rebuilt");
        Ok(entries)
    }

    async fn persist(&self, entries: Vec<RankedEntry>) -> CacheResult<()> {
        store::set_json(
            self.cache.store.as_ref(),
            &self.key,
            &CachedRankedList::new(entries),
        )
        .await
    }
}
