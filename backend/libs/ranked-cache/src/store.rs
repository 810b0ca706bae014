//! Cache store abstraction and lock-scoped read-modify-write

use std::future::Future;
use std::time::{Duration, Instant};

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::error::{CacheError, CacheResult};
use crate::metrics::CacheMetrics;

/// Lease and wait parameters for the distributed lock.
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// How long a taken lock stays valid if its holder never releases it.
    pub lease: Duration,
    /// How long `acquire` waits before failing with `LockTimeout`.
    pub timeout: Duration,
    /// Base delay between acquisition attempts.
    pub retry_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(3),
            timeout: Duration::from_secs(5),
            retry_interval: Duration::from_millis(25),
        }
    }
}

/// Proof of a held lock. Only the token that took the lock can release it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    pub key: String,
    pub token: String,
}

/// Shared key/value cache with a distributed mutual-exclusion primitive.
///
/// Values are opaque strings; typed access goes through [`get_json`] and [`set_json`].
#[async_trait::async_trait]
pub trait RankedCacheStore: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Replace the value at `key` atomically.
    async fn set(&self, key: &str, value: String) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// One round trip for many keys; result order matches `keys`.
    async fn multi_get(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>>;

    /// Block until `lock_key` is taken or `options.timeout` elapses.
    async fn acquire(&self, lock_key: &str, options: &LockOptions) -> CacheResult<LockHandle>;

    /// Release a lock; a handle whose lease already expired is a no-op.
    async fn release(&self, handle: LockHandle) -> CacheResult<()>;
}

pub async fn get_json<T: DeserializeOwned>(
    store: &dyn RankedCacheStore,
    key: &str,
) -> CacheResult<Option<T>> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub async fn set_json<T: Serialize + ?Sized>(
    store: &dyn RankedCacheStore,
    key: &str,
    value: &T,
) -> CacheResult<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, raw).await
}

/// Run `body` while holding `lock_key`.
///
/// The lock is released on every exit path of `body`, error or not. If the
/// calling future is dropped mid-body the lease bounds how long the key stays
/// locked.
pub async fn with_lock<F, Fut, T>(
    store: &dyn RankedCacheStore,
    lock_key: &str,
    options: &LockOptions,
    body: F,
) -> CacheResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = CacheResult<T>>,
{
    let metrics = CacheMetrics::new();
    let started = Instant::now();

    let handle = match store.acquire(lock_key, options).await {
        Ok(handle) => handle,
        Err(e) => {
            if matches!(e, CacheError::LockTimeout { .. }) {
                metrics.record_lock_timeout();
            }
            return Err(e);
        }
    };
    metrics.record_lock_wait(started.elapsed());
    debug!(lock = %lock_key, waited_ms = started.elapsed().as_millis() as u64, "Lock acquired");

    let result = body().await;

    if let Err(e) = store.release(handle).await {
        warn!(lock = %lock_key, error = %e, "Lock release failed, lease will expire");
    }

    result
}
