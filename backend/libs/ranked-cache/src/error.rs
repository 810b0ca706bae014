//! Ranked cache error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    /// The distributed lock for a key could not be taken in time.
    /// Callers should retry the whole read-modify-write with backoff.
    #[error("Timed out acquiring lock {key} after {waited_ms}ms")]
    LockTimeout { key: String, waited_ms: u64 },

    #[error("Cache store unavailable: {0}")]
    StoreUnavailable(String),

    /// The authoritative (relational) store failed during a rebuild.
    #[error("Authoritative store unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Unknown sort mode: {0}")]
    InconsistentSortMode(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid cache data: {0}")]
    InvalidData(String),
}

impl CacheError {
    /// Whether the failed operation may succeed if retried unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CacheError::LockTimeout { .. })
    }

    /// Lock contention or an outage of either store. Background work should
    /// try again later instead of giving up.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CacheError::LockTimeout { .. }
                | CacheError::StoreUnavailable(_)
                | CacheError::SourceUnavailable(_)
        )
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::StoreUnavailable(err.to_string())
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
