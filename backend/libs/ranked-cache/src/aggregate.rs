//! Cross-feed ranked listings
//!
//! Each feed's cached list is already sorted and capped, so the global top-K
//! is a k-way merge of per-feed lists cut at K.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use futures::future::try_join_all;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::CacheResult;
use crate::query::RankedCache;
use crate::sort::{RankedEntry, SortMode};
use crate::window::TimeWindow;

struct HeapItem {
    entry: RankedEntry,
    source: usize,
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap on key; on equal keys the lower source index pops first.
        self.entry
            .key
            .cmp(&other.entry.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

/// Lazy merge of descending sequences into one descending sequence.
///
/// Holds at most one pending entry per input.
pub struct MergeDescending<I>
where
    I: Iterator<Item = RankedEntry>,
{
    sources: Vec<I>,
    heap: BinaryHeap<HeapItem>,
}

impl<I> MergeDescending<I>
where
    I: Iterator<Item = RankedEntry>,
{
    pub fn new(sources: Vec<I>) -> Self {
        let mut sources = sources;
        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (source, iter) in sources.iter_mut().enumerate() {
            if let Some(entry) = iter.next() {
                heap.push(HeapItem { entry, source });
            }
        }
        Self { sources, heap }
    }
}

impl<I> Iterator for MergeDescending<I>
where
    I: Iterator<Item = RankedEntry>,
{
    type Item = RankedEntry;

    fn next(&mut self) -> Option<RankedEntry> {
        let HeapItem { entry, source } = self.heap.pop()?;
        if let Some(next) = self.sources[source].next() {
            self.heap.push(HeapItem {
                entry: next,
                source,
            });
        }
        Some(entry)
    }
}

/// Merges per-feed ranked lists into one global listing.
#[derive(Clone)]
pub struct CrossFeedAggregator {
    cache: RankedCache,
}

impl CrossFeedAggregator {
    pub fn new(cache: RankedCache) -> Self {
        Self { cache }
    }

    /// Global top ids across `feed_ids`, best first.
    ///
    /// Fails as a whole if any feed cannot be fetched. Modes that keep no
    /// windowed lists ignore `window`.
    #[instrument(
        skip(self, feed_ids),
        fields(feeds = feed_ids.len(), sort = %mode, window = %window)
    )]
    pub async fn top_ids(
        &self,
        feed_ids: &[Uuid],
        mode: SortMode,
        window: TimeWindow,
    ) -> CacheResult<Vec<Uuid>> {
        let window = mode.window_or_all(window);
        debug!(sort = %mode, window = %window, "Merging feed listings");

        let mut seen = HashSet::with_capacity(feed_ids.len());
        let queries: Vec<_> = feed_ids
            .iter()
            .filter(|id| seen.insert(**id))
            .map(|id| self.cache.query(*id, mode, window))
            .collect();

        let lists = try_join_all(queries.iter().map(|q| q.fetch())).await?;
        let limit = self.cache.config().precompute_limit;

        Ok(MergeDescending::new(lists.into_iter().map(Vec::into_iter).collect())
            .take(limit)
            .map(|e| e.id)
            .collect())
    }

    pub async fn trending_links(&self, feed_ids: &[Uuid]) -> CacheResult<Vec<Uuid>> {
        self.top_ids(feed_ids, SortMode::Trending, TimeWindow::All)
            .await
    }

    pub async fn new_links(&self, feed_ids: &[Uuid]) -> CacheResult<Vec<Uuid>> {
        self.top_ids(feed_ids, SortMode::New, TimeWindow::All).await
    }

    pub async fn best_links(
        &self,
        feed_ids: &[Uuid],
        window: TimeWindow,
    ) -> CacheResult<Vec<Uuid>> {
        self.top_ids(feed_ids, SortMode::Best, window).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use crate::error::CacheError;
    use crate::memory::InMemoryStore;
    use crate::model::Link;
    use crate::query::RankedCacheConfig;
    use crate::sort::SortKey;
    use crate::source::MockLinkSource;

    fn entries(keys: &[i64]) -> Vec<RankedEntry> {
        keys.iter()
            .map(|k| RankedEntry {
                id: Uuid::new_v4(),
                key: SortKey::New { created_us: *k },
            })
            .collect()
    }

    fn link(feed_id: Uuid, score: i64, age: Duration) -> Link {
        Link {
            id: Uuid::new_v4(),
            feed_id,
            title: "t".to_string(),
            url: "https://example.com".to_string(),
            score,
            hot: score as f64,
            created_at: Utc::now() - age,
        }
    }

    fn aggregator(rows: HashMap<Uuid, Vec<Link>>) -> CrossFeedAggregator {
        let mut source = MockLinkSource::new();
        source.expect_query_top_by_feed().returning(move |q| {
            rows.get(&q.feed_id)
                .cloned()
                .ok_or_else(|| CacheError::SourceUnavailable(format!("feed {}", q.feed_id)))
        });
        let cache = RankedCache::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(source),
            RankedCacheConfig::default(),
        );
        CrossFeedAggregator::new(cache)
    }

    #[test]
    fn test_merge_two_descending_lists() {
        let a = entries(&[10, 7, 3]);
        let b = entries(&[9, 8, 1]);
        let merged: Vec<i64> = MergeDescending::new(vec![a.into_iter(), b.into_iter()])
            .filter_map(|e| e.key.created_us())
            .collect();
        assert_eq!(merged, vec![10, 9, 8, 7, 3, 1]);
    }

    #[test]
    fn test_merge_handles_empty_inputs() {
        let merged: Vec<RankedEntry> =
            MergeDescending::new(vec![Vec::new().into_iter(), entries(&[2]).into_iter()]).collect();
        assert_eq!(merged.len(), 1);

        let none: Vec<std::vec::IntoIter<RankedEntry>> = Vec::new();
        assert_eq!(MergeDescending::new(none).count(), 0);
    }

    #[test]
    fn test_merge_ties_prefer_earlier_feed() {
        let a = entries(&[5]);
        let b = entries(&[5]);
        let first = a[0].id;
        let merged: Vec<Uuid> = MergeDescending::new(vec![a.into_iter(), b.into_iter()])
            .map(|e| e.id)
            .collect();
        assert_eq!(merged[0], first);
    }

    #[test]
    fn test_merge_is_lazy() {
        let pulled = std::cell::Cell::new(0);
        let counting = (0..1_000i64).rev().map(|k| {
            pulled.set(pulled.get() + 1);
            RankedEntry {
                id: Uuid::nil(),
                key: SortKey::New { created_us: k },
            }
        });
        let taken = MergeDescending::new(vec![counting]).take(3).count();
        assert_eq!(taken, 3);
        assert!(pulled.get() <= 4);
    }

    #[tokio::test]
    async fn test_trending_across_feeds() {
        let (fa, fb) = (Uuid::new_v4(), Uuid::new_v4());
        let hour = Duration::hours(1);
        let a = vec![link(fa, 10, hour), link(fa, 7, hour), link(fa, 3, hour)];
        let b = vec![link(fb, 9, hour), link(fb, 8, hour), link(fb, 1, hour)];
        let expected = vec![a[0].id, b[0].id, b[1].id, a[1].id, a[2].id, b[2].id];

        let agg = aggregator(HashMap::from([(fa, a), (fb, b)]));
        assert_eq!(agg.trending_links(&[fa, fb]).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_best_window_filters_before_merge() {
        let (fa, fb) = (Uuid::new_v4(), Uuid::new_v4());
        let old = link(fa, 100, Duration::days(8));
        let recent = link(fb, 1, Duration::days(1));
        let (old_id, recent_id) = (old.id, recent.id);

        let agg = aggregator(HashMap::from([(fa, vec![old]), (fb, vec![recent])]));
        assert_eq!(
            agg.best_links(&[fa, fb], TimeWindow::Week).await.unwrap(),
            vec![recent_id]
        );
        assert_eq!(
            agg.best_links(&[fa, fb], TimeWindow::Month).await.unwrap(),
            vec![old_id, recent_id]
        );
    }

    #[tokio::test]
    async fn test_one_failing_feed_fails_the_query() {
        let fa = Uuid::new_v4();
        let agg = aggregator(HashMap::from([(fa, vec![link(fa, 1, Duration::hours(1))])]));

        let err = agg.new_links(&[fa, Uuid::new_v4()]).await.unwrap_err();
        assert!(matches!(err, CacheError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_duplicate_feed_ids_are_ignored() {
        let fa = Uuid::new_v4();
        let row = link(fa, 1, Duration::hours(1));
        let id = row.id;

        let agg = aggregator(HashMap::from([(fa, vec![row])]));
        assert_eq!(agg.new_links(&[fa, fa]).await.unwrap(), vec![id]);
    }
}
