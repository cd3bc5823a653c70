use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const LATENCY_BUCKET_COUNT: usize = 10;
const LATENCY_BUCKETS_MS: [u64; LATENCY_BUCKET_COUNT] =
    [10, 25, 50, 100, 250, 500, 1000, 2500, 5000, 20000];

#[derive(Clone, Debug, Serialize)]
pub struct LatencySnapshot {
    pub buckets_ms: Vec<u64>,
    pub counts: Vec<u64>,
    pub overflow: u64,
    pub count: u64,
    pub avg_ms: f64,
    pub max_ms: u64,
}

#[derive(Default)]
struct LatencyMetrics {
    buckets: [AtomicU64; LATENCY_BUCKET_COUNT],
    overflow: AtomicU64,
    count: AtomicU64,
    total_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl LatencyMetrics {
    fn record(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);

        match LATENCY_BUCKETS_MS.iter().position(|bucket| ms <= *bucket) {
            Some(idx) => self.buckets[idx].fetch_add(1, Ordering::Relaxed),
            None => self.overflow.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn snapshot(&self) -> LatencySnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total_ms = self.total_ms.load(Ordering::Relaxed);
        let avg_ms = if count > 0 {
            total_ms as f64 / count as f64
        } else {
            0.0
        };
        LatencySnapshot {
            buckets_ms: LATENCY_BUCKETS_MS.to_vec(),
            counts: self
                .buckets
                .iter()
                .map(|bucket| bucket.load(Ordering::Relaxed))
                .collect(),
            overflow: self.overflow.load(Ordering::Relaxed),
            count,
            avg_ms,
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

/// Counters for draw generation.
#[derive(Default)]
pub struct DrawMetrics {
    generated: AtomicU64,
    already_generated: AtomicU64,
    in_progress: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    no_sales: AtomicU64,
    skipped_records: AtomicU64,
    rejected_body_limit: AtomicU64,
    last_duration_ms: AtomicU64,
    latency: LatencyMetrics,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawMetricsSnapshot {
    pub generated: u64,
    pub already_generated: u64,
    pub in_progress: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub no_sales: u64,
    pub skipped_records: u64,
    /// HTTP requests refused with 413 by the body limit.
    pub rejected_body_limit: u64,
    pub last_duration_ms: u64,
    pub latency: LatencySnapshot,
}

impl DrawMetrics {
    pub fn inc_generated(&self) {
        self.generated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_already_generated(&self) {
        self.already_generated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_in_progress(&self) {
        self.in_progress.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_no_sales(&self) {
        self.no_sales.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_skipped_records(&self, skipped: u64) {
        self.skipped_records.fetch_add(skipped, Ordering::Relaxed);
    }

    pub fn inc_rejected_body_limit(&self) {
        self.rejected_body_limit.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duration(&self, duration: Duration) {
        self.last_duration_ms
            .store(duration.as_millis() as u64, Ordering::Relaxed);
        self.latency.record(duration);
    }

    pub fn snapshot(&self) -> DrawMetricsSnapshot {
        DrawMetricsSnapshot {
            generated: self.generated.load(Ordering::Relaxed),
            already_generated: self.already_generated.load(Ordering::Relaxed),
            in_progress: self.in_progress.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            no_sales: self.no_sales.load(Ordering::Relaxed),
            skipped_records: self.skipped_records.load(Ordering::Relaxed),
            rejected_body_limit: self.rejected_body_limit.load(Ordering::Relaxed),
            last_duration_ms: self.last_duration_ms.load(Ordering::Relaxed),
            latency: self.latency.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let metrics = DrawMetrics::default();
        metrics.inc_generated();
        metrics.inc_generated();
        metrics.inc_in_progress();
        metrics.add_skipped_records(3);
        metrics.record_duration(Duration::from_millis(40));
        metrics.record_duration(Duration::from_millis(30_000));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.generated, 2);
        assert_eq!(snapshot.in_progress, 1);
        assert_eq!(snapshot.skipped_records, 3);
        assert_eq!(snapshot.last_duration_ms, 30_000);
        assert_eq!(snapshot.latency.count, 2);
        assert_eq!(snapshot.latency.overflow, 1);
        assert_eq!(snapshot.latency.counts[2], 1);
        assert_eq!(snapshot.latency.max_ms, 30_000);
    }
}
