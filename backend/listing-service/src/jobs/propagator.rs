//! Fan link writes out to every ranked list they affect
//!
//! Tasks carry a snapshot of the link, but a queued task can run after later
//! writes to the same link. Inserts therefore rank the row as it is now, and a
//! link that no longer exists is left out.

use std::sync::Arc;

use ranked_cache::{CacheResult, InsertOutcome, Link, RankedCache, SortMode};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::ListingTask;
use crate::db::LinkRepository;

#[derive(Clone)]
pub struct UpdatePropagator {
    cache: RankedCache,
    repo: Arc<dyn LinkRepository>,
}

impl UpdatePropagator {
    pub fn new(cache: RankedCache, repo: Arc<dyn LinkRepository>) -> Self {
        Self { cache, repo }
    }

    pub async fn handle(&self, task: &ListingTask) -> CacheResult<()> {
        match task {
            ListingTask::LinkCreated { link } => self.on_link_created(link).await,
            ListingTask::LinkScoreChanged { link } => self.on_score_changed(link).await,
            ListingTask::LinkRemoved { feed_id, link_id } => {
                self.on_link_removed(*feed_id, *link_id).await
            }
        }
    }

    /// Insert a new link into every list of its feed.
    #[instrument(skip(self, link), fields(link_id = %link.id, feed_id = %link.feed_id))]
    pub async fn on_link_created(&self, link: &Link) -> CacheResult<()> {
        let Some(current) = self.current(link).await? else {
            return Ok(());
        };
        self.insert_into(&current, &SortMode::ALL).await
    }

    /// Re-rank a link in the lists whose order depends on score. `new` is skipped.
    #[instrument(skip(self, link), fields(link_id = %link.id, feed_id = %link.feed_id))]
    pub async fn on_score_changed(&self, link: &Link) -> CacheResult<()> {
        let Some(current) = self.current(link).await? else {
            return Ok(());
        };
        let modes: Vec<SortMode> = SortMode::ALL
            .into_iter()
            .filter(SortMode::depends_on_score)
            .collect();
        self.insert_into(&current, &modes).await
    }

    #[instrument(skip(self))]
    pub async fn on_link_removed(&self, feed_id: Uuid, link_id: Uuid) -> CacheResult<()> {
        for mode in SortMode::ALL {
            for window in mode.windows() {
                let removed = self
                    .cache
                    .query(feed_id, mode, *window)
                    .delete(&[link_id])
                    .await?;
                debug!(sort = %mode, window = %window, removed, "Removed link from listing");
            }
        }
        Ok(())
    }

    /// The stored row for `link`, or `None` once it has been deleted.
    async fn current(&self, link: &Link) -> CacheResult<Option<Link>> {
        let found = self.repo.find_by_ids(&[link.id]).await?;
        let current = found.into_iter().find(|l| l.id == link.id);
        if current.is_none() {
            debug!(link_id = %link.id, "Link no longer exists, skipping listing update");
        }
        Ok(current)
    }

    async fn insert_into(&self, link: &Link, modes: &[SortMode]) -> CacheResult<()> {
        let links = std::slice::from_ref(link);
        for mode in modes {
            for window in mode.windows() {
                // Windows the link falls outside of come back Unchanged without locking.
                let outcome = self
                    .cache
                    .query(link.feed_id, *mode, *window)
                    .insert(links)
                    .await?;
                if let InsertOutcome::Updated { len } = outcome {
                    debug!(sort = %mode, window = %window, len, "Listing updated");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use chrono::{Duration, Utc};
    use ranked_cache::{
        CacheKey, InMemoryStore, LinkSource, RankedCacheConfig, TimeWindow, TopQuery,
    };
    use tokio::sync::Mutex;

    /// Rows by id. Ranked rebuilds start from nothing so tests see only
    /// what the propagator writes.
    #[derive(Default)]
    struct RowStore {
        rows: Mutex<HashMap<Uuid, Link>>,
    }

    impl RowStore {
        async fn put(&self, link: &Link) {
            self.rows.lock().await.insert(link.id, link.clone());
        }
    }

    #[async_trait::async_trait]
    impl LinkSource for RowStore {
        async fn query_top_by_feed(&self, _query: TopQuery) -> CacheResult<Vec<Link>> {
            Ok(Vec::new())
        }
    }

    #[async_trait::async_trait]
    impl LinkRepository for RowStore {
        async fn find_by_ids(&self, ids: &[Uuid]) -> CacheResult<Vec<Link>> {
            let rows = self.rows.lock().await;
            Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
        }

        async fn insert(&self, link: &Link) -> CacheResult<()> {
            self.put(link).await;
            Ok(())
        }

        async fn apply_vote(&self, id: Uuid, delta: i64) -> CacheResult<Option<Link>> {
            let mut rows = self.rows.lock().await;
            Ok(rows.get_mut(&id).map(|link| {
                link.score += delta;
                link.hot = link.score as f64;
                link.clone()
            }))
        }

        async fn delete(&self, id: Uuid) -> CacheResult<Option<Link>> {
            Ok(self.rows.lock().await.remove(&id))
        }
    }

    fn setup() -> (Arc<InMemoryStore>, Arc<RowStore>, UpdatePropagator, RankedCache) {
        let store = Arc::new(InMemoryStore::new());
        let rows = Arc::new(RowStore::default());
        let cache = RankedCache::new(store.clone(), rows.clone(), RankedCacheConfig::default());
        let propagator = UpdatePropagator::new(cache.clone(), rows.clone());
        (store, rows, propagator, cache)
    }

    fn link(age: Duration, score: i64) -> Link {
        Link {
            id: Uuid::new_v4(),
            feed_id: Uuid::new_v4(),
            title: "t".to_string(),
            url: "https://example.com".to_string(),
            score,
            hot: score as f64,
            created_at: Utc::now() - age,
        }
    }

    #[tokio::test]
    async fn test_created_link_lands_in_matching_windows_only() {
        let (_, rows, propagator, cache) = setup();
        let l = link(Duration::days(3), 1);
        rows.put(&l).await;
        propagator.on_link_created(&l).await.unwrap();

        let ids = |mode, window| {
            let q = cache.query(l.feed_id, mode, window);
            async move { q.fetch_ids().await.unwrap() }
        };
        assert_eq!(ids(SortMode::New, TimeWindow::All).await, vec![l.id]);
        assert_eq!(ids(SortMode::Trending, TimeWindow::All).await, vec![l.id]);
        assert_eq!(ids(SortMode::Best, TimeWindow::Week).await, vec![l.id]);
        assert!(ids(SortMode::Best, TimeWindow::Day).await.is_empty());
    }

    #[tokio::test]
    async fn test_score_change_skips_new() {
        let (store, rows, propagator, _) = setup();
        let l = link(Duration::hours(1), 3);
        rows.put(&l).await;
        propagator.on_score_changed(&l).await.unwrap();

        let new_key = CacheKey::ranked_list(l.feed_id, SortMode::New, TimeWindow::All);
        let best_key = CacheKey::ranked_list(l.feed_id, SortMode::Best, TimeWindow::All);
        assert!(!store.contains_key(&new_key).await);
        assert!(store.contains_key(&best_key).await);
    }

    #[tokio::test]
    async fn test_removal_clears_every_list() {
        let (_, rows, propagator, cache) = setup();
        let l = link(Duration::minutes(10), 5);
        rows.put(&l).await;
        propagator
            .handle(&ListingTask::LinkCreated { link: l.clone() })
            .await
            .unwrap();
        propagator
            .handle(&ListingTask::LinkRemoved {
                feed_id: l.feed_id,
                link_id: l.id,
            })
            .await
            .unwrap();

        for mode in SortMode::ALL {
            for window in mode.windows() {
                let ids = cache.query(l.feed_id, mode, *window).fetch_ids().await.unwrap();
                assert!(ids.is_empty(), "{} {} still lists the link", mode, window);
            }
        }
    }

    #[tokio::test]
    async fn test_redelivered_task_is_idempotent() {
        let (_, rows, propagator, cache) = setup();
        let l = link(Duration::minutes(1), 2);
        rows.put(&l).await;
        let task = ListingTask::LinkScoreChanged { link: l.clone() };

        propagator.handle(&task).await.unwrap();
        let once = cache
            .query(l.feed_id, SortMode::Best, TimeWindow::All)
            .fetch()
            .await
            .unwrap();
        propagator.handle(&task).await.unwrap();
        let twice = cache
            .query(l.feed_id, SortMode::Best, TimeWindow::All)
            .fetch()
            .await
            .unwrap();
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_score_change_for_deleted_link_is_skipped() {
        let (store, rows, propagator, _) = setup();
        let l = link(Duration::minutes(5), 4);
        rows.put(&l).await;
        rows.delete(l.id).await.unwrap();

        propagator
            .handle(&ListingTask::LinkScoreChanged { link: l.clone() })
            .await
            .unwrap();
        propagator
            .handle(&ListingTask::LinkCreated { link: l.clone() })
            .await
            .unwrap();

        for mode in SortMode::ALL {
            let key = CacheKey::ranked_list(l.feed_id, mode, TimeWindow::All);
            assert!(!store.contains_key(&key).await, "{} list was written", mode);
        }
    }

    #[tokio::test]
    async fn test_out_of_order_score_change_ranks_current_score() {
        let (_, rows, propagator, cache) = setup();
        let l = link(Duration::minutes(5), 1);
        let rival = Link {
            id: Uuid::new_v4(),
            score: 5,
            hot: 5.0,
            ..l.clone()
        };
        rows.put(&l).await;
        rows.put(&rival).await;
        propagator.on_link_created(&rival).await.unwrap();

        let stale = rows.apply_vote(l.id, 2).await.unwrap().unwrap();
        rows.apply_vote(l.id, 8).await.unwrap();

        // An earlier snapshot, delivered twice after the later vote.
        propagator.on_score_changed(&stale).await.unwrap();
        propagator.on_score_changed(&stale).await.unwrap();

        let ids = cache
            .query(l.feed_id, SortMode::Best, TimeWindow::All)
            .fetch_ids()
            .await
            .unwrap();
        assert_eq!(ids, vec![l.id, rival.id]);
    }
}
