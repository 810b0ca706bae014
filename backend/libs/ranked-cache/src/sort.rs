//! Sort key policy
//!
//! Every sort mode has two encodings of the same ranking rule: the
//! `ORDER BY` expression used against the relational store on rebuild,
//! and the [`SortKey`] used to keep cached lists ordered incrementally.
//! The two must never diverge; tests below pin them together.

use std::fmt;
use std::str::FromStr;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::CacheError;
use crate::metrics::CacheMetrics;
use crate::model::Link;
use crate::window::TimeWindow;

/// Listing sort mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    New,
    Best,
    Trending,
}

impl SortMode {
    pub const ALL: [SortMode; 3] = [SortMode::New, SortMode::Best, SortMode::Trending];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Best => "best",
            Self::Trending => "trending",
        }
    }

    /// Parse a sort name, falling back to `Trending` for anything unknown.
    ///
    /// This is the permissive behaviour listings have always had. Use
    /// `str::parse` where an unknown name should be rejected instead.
    pub fn from_name_lenient(name: &str) -> SortMode {
        match name.parse() {
            Ok(mode) => mode,
            Err(_) => {
                warn!(sort = %name, fallback = "trending", "Unknown sort mode, using default");
                CacheMetrics::new().record_sort_mode_fallback();
                SortMode::Trending
            }
        }
    }

    /// `ORDER BY` expression for the `links` table. Must agree with [`SortMode::sort_key`].
    pub fn order_by(&self) -> &'static str {
        match self {
            Self::New => "created_at DESC",
            Self::Best => "score DESC, created_at DESC",
            Self::Trending => "hot DESC",
        }
    }

    /// Whether a score change can move a link within this ordering.
    pub fn depends_on_score(&self) -> bool {
        !matches!(self, Self::New)
    }

    /// Time windows maintained for this mode.
    pub fn windows(&self) -> &'static [TimeWindow] {
        match self {
            Self::Best => &TimeWindow::ALL,
            Self::New | Self::Trending => &[TimeWindow::All],
        }
    }

    /// `window` if this mode keeps lists for it, otherwise `All`.
    pub fn window_or_all(&self, window: TimeWindow) -> TimeWindow {
        if self.windows().contains(&window) {
            window
        } else {
            TimeWindow::All
        }
    }

    pub fn sort_key(&self, link: &Link) -> SortKey {
        match self {
            Self::New => SortKey::New {
                created_us: link.created_at.timestamp_micros(),
            },
            Self::Best => SortKey::Best {
                score: link.score,
                created_us: link.created_at.timestamp_micros(),
            },
            Self::Trending => SortKey::Trending {
                hot: OrderedFloat(link.hot),
            },
        }
    }

    /// Tuple-maker: the ranked projection of `link` for this mode.
    pub fn entry(&self, link: &Link) -> RankedEntry {
        RankedEntry {
            id: link.id,
            key: self.sort_key(link),
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SortMode {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "best" => Ok(Self::Best),
            "trending" => Ok(Self::Trending),
            other => Err(CacheError::InconsistentSortMode(other.to_string())),
        }
    }
}

/// Comparison key of a ranked entry. Larger ranks first.
///
/// Keys of different variants are never compared in practice: a cached
/// list only ever holds keys produced by a single mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SortKey {
    New { created_us: i64 },
    Best { score: i64, created_us: i64 },
    Trending { hot: OrderedFloat<f64> },
}

impl SortKey {
    /// Creation time carried by the key, if the mode records one.
    pub fn created_us(&self) -> Option<i64> {
        match self {
            Self::New { created_us } | Self::Best { created_us, .. } => Some(*created_us),
            Self::Trending { .. } => None,
        }
    }
}

/// `(id, key)` pair stored in cached listings. `id` is identity only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub id: Uuid,
    pub key: SortKey,
}
