//! Cache key schema
//!
//! Key format: v{VERSION}:{entity}:{identifier}[:sub_key]
//! Lock keys are derived from the key they protect: lock:{key}

use uuid::Uuid;

use crate::sort::SortMode;
use crate::window::TimeWindow;

/// Cache schema version - increment when changing key formats
pub const CACHE_VERSION: u32 = 1;

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Ranked listing of one feed
    /// Format: v1:ranked:{feed_id}:{sort}:{window}
    pub fn ranked_list(feed_id: Uuid, mode: SortMode, window: TimeWindow) -> String {
        format!("v{}:ranked:{}:{}:{}", CACHE_VERSION, feed_id, mode, window)
    }

    /// Cached link entity
    /// Format: v1:link:{link_id}
    pub fn link(link_id: Uuid) -> String {
        format!("v{}:link:{}", CACHE_VERSION, link_id)
    }

    /// Lock guarding read-modify-write on `key`
    pub fn lock(key: &str) -> String {
        format!("lock:{}", key)
    }
}
