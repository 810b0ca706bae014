//! Ranked cache metrics for observability

use prometheus::{CounterVec, Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::OnceLock;
use std::time::Duration;

static METRICS: OnceLock<CacheMetricsInner> = OnceLock::new();

struct CacheMetricsInner {
    hits: CounterVec,
    misses: CounterVec,
    rebuilds: CounterVec,
    lock_wait: Histogram,
    lock_timeouts: IntCounter,
    sort_mode_fallbacks: IntCounter,
}

impl CacheMetricsInner {
    fn new() -> Self {
        Self {
            hits: CounterVec::new(
                Opts::new("ranked_cache_hits_total", "Ranked list fetches served from cache"),
                &["sort"],
            )
            .expect("valid metric definition"),
            misses: CounterVec::new(
                Opts::new(
                    "ranked_cache_misses_total",
                    "Ranked list fetches that required a rebuild",
                ),
                &["sort"],
            )
            .expect("valid metric definition"),
            rebuilds: CounterVec::new(
                Opts::new(
                    "ranked_cache_rebuilds_total",
                    "Ranked lists rebuilt from the relational store",
                ),
                &["sort"],
            )
            .expect("valid metric definition"),
            lock_wait: Histogram::with_opts(
                HistogramOpts::new(
                    "ranked_cache_lock_wait_seconds",
                    "Time spent acquiring ranked list locks",
                )
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
            )
            .expect("valid metric definition"),
            lock_timeouts: IntCounter::new(
                "ranked_cache_lock_timeouts_total",
                "Lock acquisitions that gave up",
            )
            .expect("valid metric definition"),
            sort_mode_fallbacks: IntCounter::new(
                "ranked_cache_sort_mode_fallbacks_total",
                "Unknown sort names mapped to the default mode",
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.hits.clone()))?;
        registry.register(Box::new(self.misses.clone()))?;
        registry.register(Box::new(self.rebuilds.clone()))?;
        registry.register(Box::new(self.lock_wait.clone()))?;
        registry.register(Box::new(self.lock_timeouts.clone()))?;
        registry.register(Box::new(self.sort_mode_fallbacks.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static CacheMetricsInner {
    METRICS.get_or_init(CacheMetricsInner::new)
}

/// Cache metrics wrapper
#[derive(Clone, Default)]
pub struct CacheMetrics;

impl CacheMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_hit(&self, sort: &str) {
        get_metrics().hits.with_label_values(&[sort]).inc();
    }

    pub fn record_miss(&self, sort: &str) {
        get_metrics().misses.with_label_values(&[sort]).inc();
    }

    pub fn record_rebuild(&self, sort: &str) {
        get_metrics().rebuilds.with_label_values(&[sort]).inc();
    }

    pub fn record_lock_wait(&self, waited: Duration) {
        get_metrics().lock_wait.observe(waited.as_secs_f64());
    }

    pub fn record_lock_timeout(&self) {
        get_metrics().lock_timeouts.inc();
    }

    pub fn record_sort_mode_fallback(&self) {
        get_metrics().sort_mode_fallbacks.inc();
    }

    pub fn hits(&self, sort: &str) -> f64 {
        get_metrics().hits.with_label_values(&[sort]).get()
    }

    pub fn misses(&self, sort: &str) -> f64 {
        get_metrics().misses.with_label_values(&[sort]).get()
    }
}
