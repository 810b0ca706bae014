//! Hit and miss counters. Kept in its own binary so the process-wide
//! counters only see this test.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use ranked_cache::{
    CacheMetrics, CacheResult, InMemoryStore, Link, LinkSource, RankedCache, RankedCacheConfig,
    SortMode, TimeWindow, TopQuery,
};

struct OneLink(Link);

#[async_trait::async_trait]
impl LinkSource for OneLink {
    async fn query_top_by_feed(&self, query: TopQuery) -> CacheResult<Vec<Link>> {
        if query.feed_id == self.0.feed_id {
            Ok(vec![self.0.clone()])
        } else {
            Ok(Vec::new())
        }
    }
}

fn link(feed_id: Uuid, age: Duration) -> Link {
    Link {
        id: Uuid::new_v4(),
        feed_id,
        title: "counted".to_string(),
        url: "https://example.com/counted".to_string(),
        score: 1,
        hot: 1.0,
        created_at: Utc::now() - age,
    }
}

#[tokio::test]
async fn only_reads_count_hits_and_misses() {
    let metrics = CacheMetrics::new();
    let feed = Uuid::new_v4();
    let cache = RankedCache::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(OneLink(link(feed, Duration::hours(1)))),
        RankedCacheConfig::default(),
    );
    let query = cache.query(feed, SortMode::New, TimeWindow::All);

    query.fetch().await.unwrap();
    assert_eq!(metrics.misses("new"), 1.0);
    assert_eq!(metrics.hits("new"), 0.0);

    for _ in 0..3 {
        query
            .insert(&[link(feed, Duration::minutes(1))])
            .await
            .unwrap();
    }
    // Inserting into a cold list rebuilds it without counting a miss.
    let other = Uuid::new_v4();
    cache
        .query(other, SortMode::New, TimeWindow::All)
        .insert(&[link(other, Duration::minutes(1))])
        .await
        .unwrap();
    assert_eq!(metrics.misses("new"), 1.0);
    assert_eq!(metrics.hits("new"), 0.0);

    assert_eq!(query.fetch().await.unwrap().len(), 4);
    assert_eq!(metrics.hits("new"), 1.0);
    assert_eq!(metrics.misses("new"), 1.0);
}
