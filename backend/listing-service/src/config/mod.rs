use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use ranked_cache::{LockOptions, RankedCacheConfig, PRECOMPUTE_LIMIT};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub cache: CacheConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub lock_lease_ms: u64,
    pub lock_timeout_ms: u64,
    pub lock_retry_ms: u64,
    pub precompute_limit: usize,
    /// Reject unknown sort names with 400 instead of falling back to trending.
    pub strict_sort_modes: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            lock_lease_ms: 3_000,
            lock_timeout_ms: 5_000,
            lock_retry_ms: 25,
            precompute_limit: PRECOMPUTE_LIMIT,
            strict_sort_modes: false,
        }
    }
}

impl CacheConfig {
    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            lease: Duration::from_millis(self.lock_lease_ms),
            timeout: Duration::from_millis(self.lock_timeout_ms),
            retry_interval: Duration::from_millis(self.lock_retry_ms),
        }
    }
}

impl From<&CacheConfig> for RankedCacheConfig {
    fn from(config: &CacheConfig) -> Self {
        RankedCacheConfig {
            precompute_limit: config.precompute_limit,
            lock: config.lock_options(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub queue_key: String,
    pub concurrency: usize,
    pub max_attempts: u32,
    pub poll_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_key: "listing:tasks".to_string(),
            concurrency: 4,
            max_attempts: 5,
            poll_secs: 5,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let cache_defaults = CacheConfig::default();
        let worker_defaults = WorkerConfig::default();

        Ok(Config {
            app: AppConfig {
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                port: env_or("APP_PORT", 8000)?,
                log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            redis: RedisConfig {
                url: std::env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            },
            cache: CacheConfig {
                lock_lease_ms: env_or("CACHE_LOCK_LEASE_MS", cache_defaults.lock_lease_ms)?,
                lock_timeout_ms: env_or("CACHE_LOCK_TIMEOUT_MS", cache_defaults.lock_timeout_ms)?,
                lock_retry_ms: env_or("CACHE_LOCK_RETRY_MS", cache_defaults.lock_retry_ms)?,
                precompute_limit: env_or("PRECOMPUTE_LIMIT", cache_defaults.precompute_limit)?,
                strict_sort_modes: env_or("STRICT_SORT_MODES", cache_defaults.strict_sort_modes)?,
            },
            worker: WorkerConfig {
                queue_key: std::env::var("TASK_QUEUE_KEY")
                    .unwrap_or(worker_defaults.queue_key),
                concurrency: env_or("WORKER_CONCURRENCY", worker_defaults.concurrency)?,
                max_attempts: env_or("WORKER_MAX_ATTEMPTS", worker_defaults.max_attempts)?,
                poll_secs: env_or("WORKER_POLL_SECS", worker_defaults.poll_secs)?,
            },
        })
    }
}

/// Parse `key` if set, otherwise use `default`. A set but malformed value is an error.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}
