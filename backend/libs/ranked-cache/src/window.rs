//! Time windows for "best" listings

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

const DAY_SECS: i64 = 24 * 60 * 60;
const MICROS_PER_SEC: i64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    #[default]
    All,
    Day,
    Week,
    Month,
    Year,
}

impl TimeWindow {
    pub const ALL: [TimeWindow; 5] = [
        TimeWindow::All,
        TimeWindow::Day,
        TimeWindow::Week,
        TimeWindow::Month,
        TimeWindow::Year,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    /// Maximum age in seconds, `None` for unbounded.
    pub fn cutoff_secs(&self) -> Option<i64> {
        match self {
            Self::All => None,
            Self::Day => Some(DAY_SECS),
            Self::Week => Some(7 * DAY_SECS),
            Self::Month => Some(30 * DAY_SECS),
            // Kept as 30 years to match listings already served under "year".
            Self::Year => Some(365 * 30 * DAY_SECS),
        }
    }

    /// Whether something created at `created_us` (epoch micros) is inside the window at `now`.
    pub fn contains(&self, created_us: i64, now: DateTime<Utc>) -> bool {
        match self.cutoff_secs() {
            None => true,
            Some(cutoff) => now.timestamp_micros() - created_us <= cutoff * MICROS_PER_SEC,
        }
    }

    /// Oldest creation time inside the window at `now`.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.cutoff_secs()
            .map(|cutoff| now - chrono::Duration::seconds(cutoff))
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TimeWindow {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            other => Err(CacheError::InvalidData(format!("unknown time window: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn aged(now: DateTime<Utc>, age: Duration) -> i64 {
        (now - age).timestamp_micros()
    }

    #[test]
    fn test_cutoffs() {
        assert_eq!(TimeWindow::All.cutoff_secs(), None);
        assert_eq!(TimeWindow::Day.cutoff_secs(), Some(86_400));
        assert_eq!(TimeWindow::Week.cutoff_secs(), Some(604_800));
        assert_eq!(TimeWindow::Month.cutoff_secs(), Some(2_592_000));
        assert_eq!(TimeWindow::Year.cutoff_secs(), Some(30 * 365 * 86_400));
    }

    #[test]
    fn test_eight_day_old_entry() {
        let now = Utc::now();
        let created = aged(now, Duration::days(8));
        assert!(!TimeWindow::Week.contains(created, now));
        assert!(TimeWindow::Month.contains(created, now));
        assert!(TimeWindow::All.contains(created, now));
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let now = Utc::now();
        assert!(TimeWindow::Day.contains(aged(now, Duration::days(1)), now));
        let just_over = Duration::days(1) + Duration::seconds(1);
        assert!(!TimeWindow::Day.contains(aged(now, just_over), now));
    }

    #[test]
    fn test_since() {
        let now = Utc::now();
        assert_eq!(TimeWindow::All.since(now), None);
        assert_eq!(TimeWindow::Week.since(now), Some(now - Duration::days(7)));
    }

    #[test]
    fn test_parse() {
        assert_eq!("month".parse::<TimeWindow>().unwrap(), TimeWindow::Month);
        assert!("decade".parse::<TimeWindow>().is_err());
    }
}
