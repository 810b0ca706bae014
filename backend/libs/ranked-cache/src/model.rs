//! Link entity as seen by the ranking layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A link submitted to a feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub title: String,
    pub url: String,
    /// Net votes.
    pub score: i64,
    /// Precomputed hotness; recomputed by the writer whenever `score` changes.
    pub hot: f64,
    pub created_at: DateTime<Utc>,
}
