//! In-process pipeline metrics.
//!
//! Plain atomics behind a global registry. `/metrics` serves a snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A value that moves up and down.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements without wrapping below zero.
    pub fn dec(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }
}

/// Latency histogram in milliseconds.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }
}

/// Every metric the pipeline records.
#[derive(Debug, Default)]
pub struct Metrics {
    // Consumer
    pub messages_consumed: Counter,
    pub consumer_read_errors: Counter,
    pub batches_flushed: Counter,
    pub batches_committed: Counter,
    pub batches_canceled: Counter,
    pub commit_errors: Counter,

    // Enrichment
    pub malformed_payloads: Counter,
    pub enrichment_requests: Counter,
    pub enrichment_failures: Counter,
    pub in_flight_enrichments: Gauge,
    pub enrichment_latency_ms: Histogram,

    // Storage
    pub objects_persisted: Counter,
    pub objects_expired: Counter,
    pub upsert_errors: Counter,
    pub sweep_errors: Counter,
    pub upsert_latency_ms: Histogram,

    // Producer
    pub messages_enqueued: Counter,
    pub producer_queue_full: Counter,
    pub messages_dropped: Counter,
    pub messages_delivered: Counter,
    pub delivery_failures: Counter,
    pub produce_latency_ms: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            messages_consumed: self.messages_consumed.get(),
            consumer_read_errors: self.consumer_read_errors.get(),
            batches_flushed: self.batches_flushed.get(),
            batches_committed: self.batches_committed.get(),
            batches_canceled: self.batches_canceled.get(),
            commit_errors: self.commit_errors.get(),
            malformed_payloads: self.malformed_payloads.get(),
            enrichment_requests: self.enrichment_requests.get(),
            enrichment_failures: self.enrichment_failures.get(),
            in_flight_enrichments: self.in_flight_enrichments.get(),
            objects_persisted: self.objects_persisted.get(),
            objects_expired: self.objects_expired.get(),
            upsert_errors: self.upsert_errors.get(),
            sweep_errors: self.sweep_errors.get(),
            messages_enqueued: self.messages_enqueued.get(),
            producer_queue_full: self.producer_queue_full.get(),
            messages_dropped: self.messages_dropped.get(),
            messages_delivered: self.messages_delivered.get(),
            delivery_failures: self.delivery_failures.get(),
            enrichment_latency_mean_ms: self.enrichment_latency_ms.mean(),
            upsert_latency_mean_ms: self.upsert_latency_ms.mean(),
            produce_latency_mean_ms: self.produce_latency_ms.mean(),
        }
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub messages_consumed: u64,
    pub consumer_read_errors: u64,
    pub batches_flushed: u64,
    pub batches_committed: u64,
    pub batches_canceled: u64,
    pub commit_errors: u64,
    pub malformed_payloads: u64,
    pub enrichment_requests: u64,
    pub enrichment_failures: u64,
    pub in_flight_enrichments: u64,
    pub objects_persisted: u64,
    pub objects_expired: u64,
    pub upsert_errors: u64,
    pub sweep_errors: u64,
    pub messages_enqueued: u64,
    pub producer_queue_full: u64,
    pub messages_dropped: u64,
    pub messages_delivered: u64,
    pub delivery_failures: u64,
    pub enrichment_latency_mean_ms: f64,
    pub upsert_latency_mean_ms: f64,
    pub produce_latency_mean_ms: f64,
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
