//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use crate::services::dwell_extractor::ExtractionStats;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential request latency bucket boundaries (milliseconds)
/// Buckets: ≤5, ≤10, ≤25, ≤50, ≤100, ≤250, ≤500, ≤1000, ≤2500, ≤5000, >5000
const BUCKET_BOUNDS: [u64; 10] = [5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Upper bound of the bucket holding the given percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Last bucket reports 2x the previous bound
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000, 10000];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// Shared across pipeline runs behind an `Arc`. Monotonic totals never
/// reset; latency counters reset on `report()`.
pub struct Metrics {
    /// Pipeline requests started (monotonic)
    requests_total: AtomicU64,
    /// Requests since last report (reset on report)
    requests_since_report: AtomicU64,
    /// Raw pings pulled from the warehouse (monotonic)
    pings_processed: AtomicU64,
    /// Dwell events emitted by the extractor (monotonic)
    events_emitted: AtomicU64,
    /// Clusters dropped as shorter than the minimum dwell (monotonic)
    clusters_dropped: AtomicU64,
    /// Dwell durations clamped to the cap (monotonic)
    dwell_capped: AtomicU64,
    /// Zones whose count query failed (monotonic)
    zone_failures: AtomicU64,
    /// Requests aborted by a warehouse error (monotonic)
    warehouse_failures: AtomicU64,
    /// Sum of request latencies in ms (reset on report)
    latency_sum_ms: AtomicU64,
    /// Max request latency in ms (reset on report)
    latency_max_ms: AtomicU64,
    /// Request latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            requests_since_report: AtomicU64::new(0),
            pings_processed: AtomicU64::new(0),
            events_emitted: AtomicU64::new(0),
            clusters_dropped: AtomicU64::new(0),
            dwell_capped: AtomicU64::new(0),
            zone_failures: AtomicU64::new(0),
            warehouse_failures: AtomicU64::new(0),
            latency_sum_ms: AtomicU64::new(0),
            latency_max_ms: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.requests_since_report.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_request_latency(&self, latency_ms: u64) {
        self.latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_ms, latency_ms);
        self.latency_buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_pings(&self, count: u64) {
        self.pings_processed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_extraction(&self, stats: &ExtractionStats) {
        self.events_emitted.fetch_add(stats.emitted, Ordering::Relaxed);
        self.clusters_dropped.fetch_add(stats.dropped_short, Ordering::Relaxed);
        self.dwell_capped.fetch_add(stats.capped, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_zone_failure(&self) {
        self.zone_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_warehouse_failure(&self) {
        self.warehouse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn pings_processed(&self) -> u64 {
        self.pings_processed.load(Ordering::Relaxed)
    }

    pub fn events_emitted(&self) -> u64 {
        self.events_emitted.load(Ordering::Relaxed)
    }

    pub fn zone_failures(&self) -> u64 {
        self.zone_failures.load(Ordering::Relaxed)
    }

    pub fn warehouse_failures(&self) -> u64 {
        self.warehouse_failures.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    pub fn report(&self) -> MetricsSummary {
        let request_count = self.requests_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_ms.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_ms.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let requests_per_sec = if elapsed.as_secs_f64() > 0.0 {
            request_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let timed: u64 = lat_buckets.iter().sum();
        let avg_latency = if timed > 0 { latency_sum / timed } else { 0 };

        MetricsSummary {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_per_sec,
            pings_processed: self.pings_processed.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            clusters_dropped: self.clusters_dropped.load(Ordering::Relaxed),
            dwell_capped: self.dwell_capped.load(Ordering::Relaxed),
            zone_failures: self.zone_failures.load(Ordering::Relaxed),
            warehouse_failures: self.warehouse_failures.load(Ordering::Relaxed),
            avg_latency_ms: avg_latency,
            max_latency_ms: max_latency,
            lat_buckets,
            lat_p50_ms: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p95_ms: percentile_from_buckets(&lat_buckets, 0.95),
            lat_p99_ms: percentile_from_buckets(&lat_buckets, 0.99),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub requests_total: u64,
    pub requests_per_sec: f64,
    pub pings_processed: u64,
    pub events_emitted: u64,
    pub clusters_dropped: u64,
    pub dwell_capped: u64,
    pub zone_failures: u64,
    pub warehouse_failures: u64,
    pub avg_latency_ms: u64,
    pub max_latency_ms: u64,
    /// Bounds: ≤5, ≤10, ≤25, ≤50, ≤100, ≤250, ≤500, ≤1000, ≤2500, ≤5000, >5000 ms
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_p50_ms: u64,
    pub lat_p95_ms: u64,
    pub lat_p99_ms: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            requests_total = %self.requests_total,
            requests_per_sec = format!("{:.2}", self.requests_per_sec),
            pings_processed = %self.pings_processed,
            events_emitted = %self.events_emitted,
            clusters_dropped = %self.clusters_dropped,
            dwell_capped = %self.dwell_capped,
            zone_failures = %self.zone_failures,
            warehouse_failures = %self.warehouse_failures,
            avg_latency_ms = %self.avg_latency_ms,
            max_latency_ms = %self.max_latency_ms,
            p50_ms = %self.lat_p50_ms,
            p99_ms = %self.lat_p99_ms,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.requests_total(), 0);
        assert_eq!(metrics.pings_processed(), 0);
    }

    #[test]
    fn test_record_extraction() {
        let metrics = Metrics::new();
        let stats = ExtractionStats { emitted: 4, dropped_short: 2, capped: 1, ..Default::default() };
        metrics.record_extraction(&stats);
        metrics.record_extraction(&stats);

        let summary = metrics.report();
        assert_eq!(summary.events_emitted, 8);
        assert_eq!(summary.clusters_dropped, 4);
        assert_eq!(summary.dwell_capped, 2);
    }

    #[test]
    fn test_report_resets_latency_only() {
        let metrics = Metrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_request_latency(20);
        metrics.record_request_latency(40);
        metrics.record_zone_failure();

        let summary = metrics.report();
        assert_eq!(summary.requests_total, 2);
        assert_eq!(summary.avg_latency_ms, 30);
        assert_eq!(summary.max_latency_ms, 40);
        assert_eq!(summary.zone_failures, 1);

        let again = metrics.report();
        assert_eq!(again.requests_total, 2);
        assert_eq!(again.zone_failures, 1);
        assert_eq!(again.avg_latency_ms, 0);
        assert_eq!(again.max_latency_ms, 0);
    }

    #[test]
    fn test_report_empty() {
        let summary = Metrics::new().report();
        assert_eq!(summary.requests_total, 0);
        assert_eq!(summary.avg_latency_ms, 0);
        assert_eq!(summary.lat_p99_ms, 0);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(Metrics::new());
        let mut handles = vec![];

        for _ in 0..8 {
            let m = metrics.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..500 {
                    m.record_request();
                    m.record_pings(3);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(metrics.requests_total(), 4_000);
        assert_eq!(metrics.pings_processed(), 12_000);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(5), 0);
        assert_eq!(bucket_index(6), 1);
        assert_eq!(bucket_index(1000), 7);
        assert_eq!(bucket_index(5000), 9);
        assert_eq!(bucket_index(5001), 10);
    }

    #[test]
    fn test_percentile_computation() {
        let metrics = Metrics::new();
        for _ in 0..100 {
            metrics.record_request_latency(30);
        }
        let summary = metrics.report();
        assert_eq!(summary.lat_buckets[3], 100);
        assert_eq!(summary.lat_p50_ms, 50);
        assert_eq!(summary.lat_p99_ms, 50);
    }
}
