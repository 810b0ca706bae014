//! In-process cache store with the same get/set/lock semantics as Redis.
//!
//! Used by tests and single-node development setups.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use uuid::Uuid;

use crate::error::{CacheError, CacheResult};
use crate::store::{LockHandle, LockOptions, RankedCacheStore};

struct HeldLock {
    token: String,
    expires_at: Instant,
}

#[derive(Default)]
pub struct InMemoryStore {
    values: Mutex<HashMap<String, String>>,
    locks: Mutex<HashMap<String, HeldLock>>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `StoreUnavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        self.values.lock().await.contains_key(key)
    }

    fn check_available(&self) -> CacheResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::StoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RankedCacheStore for InMemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check_available()?;
        // Give concurrent callers a chance to interleave, as a network hop would.
        tokio::task::yield_now().await;
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> CacheResult<()> {
        self.check_available()?;
        tokio::task::yield_now().await;
        self.values.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.check_available()?;
        self.values.lock().await.remove(key);
        Ok(())
    }

    async fn multi_get(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>> {
        self.check_available()?;
        let values = self.values.lock().await;
        Ok(keys.iter().map(|k| values.get(k).cloned()).collect())
    }

    async fn acquire(&self, lock_key: &str, options: &LockOptions) -> CacheResult<LockHandle> {
        let started = Instant::now();
        let deadline = started + options.timeout;

        loop {
            self.check_available()?;
            {
                let mut locks = self.locks.lock().await;
                let now = Instant::now();
                let free = locks
                    .get(lock_key)
                    .map(|held| held.expires_at <= now)
                    .unwrap_or(true);

                if free {
                    let token = Uuid::new_v4().to_string();
                    locks.insert(
                        lock_key.to_string(),
                        HeldLock {
                            token: token.clone(),
                            expires_at: now + options.lease,
                        },
                    );
                    return Ok(LockHandle {
                        key: lock_key.to_string(),
                        token,
                    });
                }
            }

            if Instant::now() >= deadline {
                return Err(CacheError::LockTimeout {
                    key: lock_key.to_string(),
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            sleep(options.retry_interval).await;
        }
    }

    async fn release(&self, handle: LockHandle) -> CacheResult<()> {
        self.check_available()?;
        let mut locks = self.locks.lock().await;
        if locks
            .get(&handle.key)
            .map(|held| held.token == handle.token)
            .unwrap_or(false)
        {
            locks.remove(&handle.key);
        }
        Ok(())
    }
}
