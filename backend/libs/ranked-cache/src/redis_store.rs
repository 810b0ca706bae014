//! Redis implementation of [`RankedCacheStore`]
//!
//! - Values are stored as plain strings (JSON written by callers)
//! - Locks use `SET key token NX PX lease`
//! - Release is a compare-and-delete script, so a holder whose lease expired
//!   never deletes a lock someone else has since taken

use std::sync::Arc;
use std::time::{Duration, Instant};

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{CacheError, CacheResult};
use crate::store::{LockHandle, LockOptions, RankedCacheStore};

/// Shared Redis connection manager
pub type SharedRedis = Arc<Mutex<ConnectionManager>>;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

#[derive(Clone)]
pub struct RedisStore {
    redis: SharedRedis,
    release_script: Arc<Script>,
}

impl RedisStore {
    pub fn new(redis: SharedRedis) -> Self {
        Self {
            redis,
            release_script: Arc::new(Script::new(RELEASE_SCRIPT)),
        }
    }

    /// Open a connection manager for `redis_url`.
    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self::new(Arc::new(Mutex::new(manager))))
    }

    pub fn connection(&self) -> SharedRedis {
        Arc::clone(&self.redis)
    }

    /// Ping Redis to check connection health
    pub async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.redis.lock().await;
        redis::cmd("PING")
            .query_async::<_, String>(&mut *conn)
            .await
            .map_err(|e| {
                warn!(error = %e, "Redis PING failed");
                CacheError::from(e)
            })?;
        Ok(())
    }

    /// Add jitter to the retry interval so contending workers spread out
    fn with_jitter(base: Duration) -> Duration {
        let base_ms = base.as_millis().max(1) as u64;
        let jitter = rand::random::<u64>() % (base_ms / 2 + 1);
        Duration::from_millis(base_ms + jitter)
    }

    async fn try_acquire(&self, lock_key: &str, token: &str, lease: Duration) -> CacheResult<bool> {
        let mut conn = self.redis.lock().await;
        let reply: Option<String> = redis::cmd("SET")
            .arg(lock_key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(lease.as_millis().max(1) as u64)
            .query_async(&mut *conn)
            .await?;
        Ok(reply.is_some())
    }
}

#[async_trait::async_trait]
impl RankedCacheStore for RedisStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.redis.lock().await;
        let value: Option<String> = conn.get(key).await.map_err(|e| {
            warn!(key = %key, error = %e, "Redis GET failed");
            CacheError::from(e)
        })?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String) -> CacheResult<()> {
        let mut conn = self.redis.lock().await;
        conn.set::<_, _, ()>(key, value).await.map_err(|e| {
            warn!(key = %key, error = %e, "Redis SET failed");
            CacheError::from(e)
        })?;
        debug!(key = %key, "Cache set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.redis.lock().await;
        conn.del::<_, ()>(key).await?;
        debug!(key = %key, "Cache delete");
        Ok(())
    }

    async fn multi_get(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.redis.lock().await;
        // Explicit MGET: a single-key AsyncCommands::mget degrades to GET.
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut *conn)
            .await?;
        Ok(values)
    }

    #[instrument(skip(self, options), fields(lease_ms = options.lease.as_millis() as u64))]
    async fn acquire(&self, lock_key: &str, options: &LockOptions) -> CacheResult<LockHandle> {
        let token = Uuid::new_v4().to_string();
        let started = Instant::now();

        loop {
            if self.try_acquire(lock_key, &token, options.lease).await? {
                return Ok(LockHandle {
                    key: lock_key.to_string(),
                    token,
                });
            }

            if started.elapsed() >= options.timeout {
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!(lock = %lock_key, waited_ms, "Lock acquisition timed out");
                return Err(CacheError::LockTimeout {
                    key: lock_key.to_string(),
                    waited_ms,
                });
            }

            sleep(Self::with_jitter(options.retry_interval)).await;
        }
    }

    async fn release(&self, handle: LockHandle) -> CacheResult<()> {
        let mut conn = self.redis.lock().await;
        let released: i32 = self
            .release_script
            .key(&handle.key)
            .arg(&handle.token)
            .invoke_async(&mut *conn)
            .await?;

        if released == 0 {
            debug!(lock = %handle.key, "Lock lease expired before release");
        }
        Ok(())
    }
}
