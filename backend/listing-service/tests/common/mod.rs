//! Shared fixtures for listing-service integration tests
//!
//! Everything runs in process: an in-memory link table, the in-memory cache
//! store and the in-memory task queue.

#![allow(dead_code)]

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use listing_service::config::WorkerConfig;
use listing_service::db::LinkRepository;
use listing_service::jobs::{MemoryTaskQueue, TaskQueue, UpdatePropagator, Worker};
use listing_service::links::{hot_score, LinkCache};
use listing_service::listings::ListingService;
use ranked_cache::{
    CacheResult, InMemoryStore, Link, LinkSource, LockOptions, RankedCache, RankedCacheConfig,
    TopQuery,
};
use uuid::Uuid;

/// In-memory stand-in for the `links` table.
#[derive(Default)]
pub struct MemoryLinkRepo {
    links: Mutex<HashMap<Uuid, Link>>,
    top_queries: Mutex<usize>,
}

impl MemoryLinkRepo {
    pub fn get(&self, id: Uuid) -> Option<Link> {
        self.links.lock().unwrap().get(&id).cloned()
    }

    /// Number of ranked rebuild queries served.
    pub fn top_queries(&self) -> usize {
        *self.top_queries.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl LinkSource for MemoryLinkRepo {
    async fn query_top_by_feed(&self, query: TopQuery) -> CacheResult<Vec<Link>> {
        *self.top_queries.lock().unwrap() += 1;
        let mut rows: Vec<Link> = self
            .links
            .lock()
            .unwrap()
            .values()
            .filter(|l| l.feed_id == query.feed_id)
            .filter(|l| query.since.map_or(true, |since| l.created_at >= since))
            .cloned()
            .collect();
        rows.sort_by_key(|l| Reverse(query.mode.sort_key(l)));
        rows.truncate(query.limit);
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl LinkRepository for MemoryLinkRepo {
    async fn find_by_ids(&self, ids: &[Uuid]) -> CacheResult<Vec<Link>> {
        let links = self.links.lock().unwrap();
        Ok(ids.iter().filter_map(|id| links.get(id).cloned()).collect())
    }

    async fn insert(&self, link: &Link) -> CacheResult<()> {
        self.links.lock().unwrap().insert(link.id, link.clone());
        Ok(())
    }

    async fn apply_vote(&self, id: Uuid, delta: i64) -> CacheResult<Option<Link>> {
        let mut links = self.links.lock().unwrap();
        Ok(links.get_mut(&id).map(|link| {
            link.score += delta;
            link.hot = hot_score(link.score, link.created_at);
            link.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> CacheResult<Option<Link>> {
        Ok(self.links.lock().unwrap().remove(&id))
    }
}

pub fn quick_lock() -> LockOptions {
    LockOptions {
        lease: Duration::from_secs(2),
        timeout: Duration::from_millis(100),
        retry_interval: Duration::from_millis(5),
    }
}

/// Wired-up service with handles on every in-memory backend.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub repo: Arc<MemoryLinkRepo>,
    pub queue: Arc<MemoryTaskQueue>,
    pub cache: RankedCache,
    pub links: Arc<LinkCache>,
    pub service: ListingService,
    pub worker: Worker,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(false, WorkerConfig::default())
    }

    pub fn strict() -> Self {
        Self::with_options(true, WorkerConfig::default())
    }

    pub fn with_options(strict_sort_modes: bool, worker_config: WorkerConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let repo = Arc::new(MemoryLinkRepo::default());
        let queue = MemoryTaskQueue::new();

        let config = RankedCacheConfig {
            lock: quick_lock(),
            ..RankedCacheConfig::default()
        };
        let cache = RankedCache::new(store.clone(), repo.clone(), config);
        let links = Arc::new(LinkCache::new(
            store.clone(),
            repo.clone(),
            queue.clone(),
            quick_lock(),
        ));
        let service = ListingService::new(cache.clone(), links.clone(), strict_sort_modes);
        let worker = Worker::new(
            0,
            queue.clone(),
            Arc::new(UpdatePropagator::new(cache.clone(), repo.clone())),
            &worker_config,
        );

        Self {
            store,
            repo,
            queue,
            cache,
            links,
            service,
            worker,
        }
    }

    /// Apply every queued task. Returns how many were processed.
    pub async fn drain(&self) -> usize {
        let mut processed = 0;
        while let Some(envelope) = self
            .queue
            .dequeue(Duration::from_millis(1))
            .await
            .expect("memory queue never fails")
        {
            self.worker.process(envelope).await;
            processed += 1;
        }
        processed
    }
}
