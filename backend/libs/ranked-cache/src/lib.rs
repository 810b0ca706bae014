//! Ranked listing cache
//!
//! Keeps a bounded, sorted top-K list per (feed, sort, window) in a shared
//! cache. Lists are rebuilt from the authoritative store on miss, maintained
//! incrementally on writes under a distributed lock, and merged across feeds
//! for combined listings.
//!
//! # Example
//!
//! ```ignore
//! use ranked_cache::{RankedCache, RankedCacheConfig, RedisStore, SortMode, TimeWindow};
//!
//! let store = Arc::new(RedisStore::connect("redis://127.0.0.1/").await?);
//! let cache = RankedCache::new(store, source, RankedCacheConfig::default());
//!
//! let ids = cache
//!     .query(feed_id, SortMode::Best, TimeWindow::Week)
//!     .fetch_ids()
//!     .await?;
//! ```

pub mod aggregate;
pub mod error;
pub mod keys;
pub mod memory;
pub mod metrics;
pub mod model;
pub mod query;
pub mod ranked_list;
pub mod redis_store;
pub mod sort;
pub mod source;
pub mod store;
pub mod window;

pub use aggregate::{CrossFeedAggregator, MergeDescending};
pub use error::{CacheError, CacheResult};
pub use keys::{CacheKey, CACHE_VERSION};
pub use memory::InMemoryStore;
pub use metrics::CacheMetrics;
pub use model::Link;
pub use query::{
    CachedRankedList, EntryFilter, FeedRankedQuery, InsertOutcome, RankedCache,
    RankedCacheConfig, LIST_SCHEMA_VERSION,
};
pub use redis_store::{RedisStore, SharedRedis};
pub use sort::{RankedEntry, SortKey, SortMode};
pub use source::{LinkSource, TopQuery};
pub use store::{get_json, set_json, with_lock, LockHandle, LockOptions, RankedCacheStore};
pub use window::TimeWindow;

/// Maximum length of a cached ranked list.
pub const PRECOMPUTE_LIMIT: usize = 1000;
