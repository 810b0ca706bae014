/// Link Repository
///
/// PostgreSQL access for the `links` table:
///
/// ```sql
/// CREATE TABLE links (
///     id         UUID PRIMARY KEY,
///     feed_id    UUID NOT NULL,
///     title      TEXT NOT NULL,
///     url        TEXT NOT NULL,
///     score      BIGINT NOT NULL DEFAULT 0,
///     hot        DOUBLE PRECISION NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT now()
/// );
/// ```
use chrono::{DateTime, Utc};
use ranked_cache::{CacheError, CacheResult, Link, LinkSource, SortMode, TopQuery};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{error, instrument};
use uuid::Uuid;

use crate::links::hot_score;

const LINK_COLUMNS: &str = "id, feed_id, title, url, score, hot, created_at";

/// A link about to be submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLink {
    pub feed_id: Uuid,
    pub title: String,
    pub url: String,
}

#[derive(Debug, sqlx::FromRow)]
struct LinkRow {
    id: Uuid,
    feed_id: Uuid,
    title: String,
    url: String,
    score: i64,
    hot: f64,
    created_at: DateTime<Utc>,
}

impl From<LinkRow> for Link {
    fn from(row: LinkRow) -> Self {
        Link {
            id: row.id,
            feed_id: row.feed_id,
            title: row.title,
            url: row.url,
            score: row.score,
            hot: row.hot,
            created_at: row.created_at,
        }
    }
}

fn db_error(context: &str, err: sqlx::Error) -> CacheError {
    error!("{}: {}", context, err);
    CacheError::SourceUnavailable(format!("{}: {}", context, err))
}

/// Row-level operations on links, on top of the ranked rebuild query.
#[async_trait::async_trait]
pub trait LinkRepository: LinkSource {
    /// Links for `ids` that exist, in no particular order.
    async fn find_by_ids(&self, ids: &[Uuid]) -> CacheResult<Vec<Link>>;

    async fn insert(&self, link: &Link) -> CacheResult<()>;

    /// Add `delta` to the score and recompute `hot` in one atomic step.
    /// `None` if the link does not exist.
    async fn apply_vote(&self, id: Uuid, delta: i64) -> CacheResult<Option<Link>>;

    /// Delete and return the removed link.
    async fn delete(&self, id: Uuid) -> CacheResult<Option<Link>>;
}

#[derive(Clone)]
pub struct PgLinkRepo {
    pool: PgPool,
}

impl PgLinkRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn top_sql(mode: SortMode, windowed: bool) -> String {
        let filter = if windowed {
            "feed_id = $1 AND created_at >= $3"
        } else {
            "feed_id = $1"
        };
        format!(
            "SELECT {} FROM links WHERE {} ORDER BY {} LIMIT $2",
            LINK_COLUMNS,
            filter,
            mode.order_by()
        )
    }
}

#[async_trait::async_trait]
impl LinkSource for PgLinkRepo {
    #[instrument(skip(self), fields(feed_id = %query.feed_id, sort = %query.mode))]
    async fn query_top_by_feed(&self, query: TopQuery) -> CacheResult<Vec<Link>> {
        let sql = Self::top_sql(query.mode, query.since.is_some());
        let mut statement = sqlx::query_as::<_, LinkRow>(&sql)
            .bind(query.feed_id)
            .bind(query.limit as i64);
        if let Some(since) = query.since {
            statement = statement.bind(since);
        }

        let rows = statement
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to query top links", e))?;
        Ok(rows.into_iter().map(Link::from).collect())
    }
}

#[async_trait::async_trait]
impl LinkRepository for PgLinkRepo {
    async fn find_by_ids(&self, ids: &[Uuid]) -> CacheResult<Vec<Link>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {} FROM links WHERE id = ANY($1)", LINK_COLUMNS);
        let rows = sqlx::query_as::<_, LinkRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to load links", e))?;
        Ok(rows.into_iter().map(Link::from).collect())
    }

    async fn insert(&self, link: &Link) -> CacheResult<()> {
        sqlx::query(
            r#"
            INSERT INTO links (id, feed_id, title, url, score, hot, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(link.id)
        .bind(link.feed_id)
        .bind(&link.title)
        .bind(&link.url)
        .bind(link.score)
        .bind(link.hot)
        .bind(link.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert link", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn apply_vote(&self, id: Uuid, delta: i64) -> CacheResult<Option<Link>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to start vote transaction", e))?;

        let select = format!("SELECT {} FROM links WHERE id = $1 FOR UPDATE", LINK_COLUMNS);
        let current = sqlx::query_as::<_, LinkRow>(&select)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to lock link for vote", e))?;
        let Some(current) = current else {
            return Ok(None);
        };

        let score = current.score + delta;
        let hot = hot_score(score, current.created_at);
        let update = format!(
            "UPDATE links SET score = $2, hot = $3 WHERE id = $1 RETURNING {}",
            LINK_COLUMNS
        );
        let row = sqlx::query_as::<_, LinkRow>(&update)
            .bind(id)
            .bind(score)
            .bind(hot)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to apply vote", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit vote", e))?;
        Ok(Some(Link::from(row)))
    }

    async fn delete(&self, id: Uuid) -> CacheResult<Option<Link>> {
        let sql = format!("DELETE FROM links WHERE id = $1 RETURNING {}", LINK_COLUMNS);
        let row = sqlx::query_as::<_, LinkRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete link", e))?;
        Ok(row.map(Link::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_sql_uses_sort_ordering() {
        let sql = PgLinkRepo::top_sql(SortMode::Best, false);
        assert!(sql.ends_with("ORDER BY score DESC, created_at DESC LIMIT $2"));
        assert!(!sql.contains("$3"));
    }

    #[test]
    fn test_windowed_top_sql_filters_creation_time() {
        let sql = PgLinkRepo::top_sql(SortMode::Best, true);
        assert!(sql.contains("created_at >= $3"));
    }
}
