//! Link entity cache
//!
//! Links are cached whole under `v1:link:{id}` and loaded through from
//! PostgreSQL on miss. Every write also enqueues the listing task that keeps
//! ranked lists in step.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ranked_cache::{
    get_json, set_json, with_lock, CacheKey, CacheResult, Link, LockOptions, RankedCacheStore,
};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::db::{LinkRepository, NewLink};
use crate::error::{AppError, Result};
use crate::jobs::{ListingTask, TaskEnvelope, TaskQueue};
use crate::metrics;

/// Seconds of age worth one order of magnitude of votes.
const HOT_TIME_DIVISOR: f64 = 45_000.0;

/// Hotness of a link: `sign(s) * log10(max(|s|, 1)) + created / 45000`,
/// rounded to 7 places.
pub fn hot_score(score: i64, created_at: DateTime<Utc>) -> f64 {
    let order = (score.unsigned_abs().max(1) as f64).log10();
    let sign = score.signum() as f64;
    let micros = f64::from(created_at.timestamp_subsec_micros());
    let seconds = created_at.timestamp() as f64 + micros / 1e6;
    let hot = sign * order + seconds / HOT_TIME_DIVISOR;
    (hot * 1e7).round() / 1e7
}

#[derive(Clone)]
pub struct LinkCache {
    store: Arc<dyn RankedCacheStore>,
    repo: Arc<dyn LinkRepository>,
    queue: Arc<dyn TaskQueue>,
    lock: LockOptions,
}

impl LinkCache {
    pub fn new(
        store: Arc<dyn RankedCacheStore>,
        repo: Arc<dyn LinkRepository>,
        queue: Arc<dyn TaskQueue>,
        lock: LockOptions,
    ) -> Self {
        Self {
            store,
            repo,
            queue,
            lock,
        }
    }

    pub async fn by_id(&self, id: Uuid) -> Result<Option<Link>> {
        Ok(self.by_ids(&[id]).await?.into_iter().next())
    }

    /// Links for `ids` in the same order. Ids with no link are skipped.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn by_ids(&self, ids: &[Uuid]) -> Result<Vec<Link>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| CacheKey::link(*id)).collect();
        let cached = self.store.multi_get(&keys).await?;

        let mut found: HashMap<Uuid, Link> = HashMap::with_capacity(ids.len());
        let mut missing = Vec::new();
        for (id, raw) in ids.iter().zip(cached) {
            match raw.map(|raw| serde_json::from_str::<Link>(&raw)) {
                Some(Ok(link)) => {
                    found.insert(*id, link);
                }
                Some(Err(e)) => {
                    warn!(link_id = %id, error = %e, "Undecodable cached link, reloading");
                    missing.push(*id);
                }
                None => missing.push(*id),
            }
        }

        let hits = found.len();
        metrics::record_link_lookups(hits, missing.len());

        if !missing.is_empty() {
            for link in self.repo.find_by_ids(&missing).await? {
                self.write_to_cache(&link).await?;
                found.insert(link.id, link);
            }
            debug!(hits, misses = missing.len(), "Loaded links through cache");
        }

        Ok(ids.iter().filter_map(|id| found.get(id).cloned()).collect())
    }

    /// Store a new link and schedule its listing inserts.
    pub async fn create(&self, new_link: NewLink) -> Result<Link> {
        let created_at = Utc::now();
        let link = Link {
            id: Uuid::new_v4(),
            feed_id: new_link.feed_id,
            title: new_link.title,
            url: new_link.url,
            score: 0,
            hot: hot_score(0, created_at),
            created_at,
        };

        self.repo.insert(&link).await?;
        self.write_to_cache(&link).await?;
        self.enqueue(ListingTask::LinkCreated { link: link.clone() })
            .await?;
        Ok(link)
    }

    /// Apply a vote under the link's lock. The repository refreshes hotness
    /// in the same step.
    #[instrument(skip(self))]
    pub async fn vote(&self, link_id: Uuid, delta: i64) -> Result<Link> {
        let key = CacheKey::link(link_id);
        let lock_key = CacheKey::lock(&key);

        let updated = with_lock(self.store.as_ref(), &lock_key, &self.lock, move || {
            self.apply_vote_locked(link_id, delta)
        })
        .await?
        .ok_or_else(|| AppError::NotFound(format!("link {}", link_id)))?;

        self.enqueue(ListingTask::LinkScoreChanged {
            link: updated.clone(),
        })
        .await?;
        Ok(updated)
    }

    /// Delete a link and schedule its removal from every listing.
    pub async fn remove(&self, link_id: Uuid) -> Result<()> {
        let removed = self
            .repo
            .delete(link_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("link {}", link_id)))?;

        self.store.delete(&CacheKey::link(link_id)).await?;
        self.enqueue(ListingTask::LinkRemoved {
            feed_id: removed.feed_id,
            link_id,
        })
        .await
    }

    async fn apply_vote_locked(&self, link_id: Uuid, delta: i64) -> CacheResult<Option<Link>> {
        let Some(link) = self.repo.apply_vote(link_id, delta).await? else {
            return Ok(None);
        };
        self.write_to_cache(&link).await?;
        Ok(Some(link))
    }

    async fn write_to_cache(&self, link: &Link) -> CacheResult<()> {
        set_json(self.store.as_ref(), &CacheKey::link(link.id), link).await
    }

    async fn enqueue(&self, task: ListingTask) -> Result<()> {
        self.queue.enqueue(TaskEnvelope::new(task)).await
    }

    /// Cached copy only, no database fallback.
    pub async fn cached(&self, link_id: Uuid) -> Result<Option<Link>> {
        Ok(get_json(self.store.as_ref(), &CacheKey::link(link_id)).await?)
    }
}
