//! Request queue metrics
//!
//! Tracks the lifecycle of verification requests through the store: queue
//! depth by `RequestStatus`, the greylist-deferral backlog, and end-to-end
//! request duration.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

use crate::MetricsError;

/// Queue metrics collector
#[derive(Debug)]
pub struct QueueMetrics {
    /// Total number of requests that reached a terminal status, by status
    requests_total: Counter<u64>,

    /// Distribution of end-to-end request durations, queued to terminal
    request_duration_seconds: Histogram<f64>,

    queued: Arc<AtomicU64>,
    processing: Arc<AtomicU64>,
    greylist_deferred: Arc<AtomicU64>,
    anti_greylist_backlog: Arc<AtomicU64>,
}

impl QueueMetrics {
    /// Create a new queue metrics collector
    ///
    /// # Errors
    ///
    /// Returns an error if metric instruments cannot be created.
    pub fn new() -> Result<Self, MetricsError> {
        let meter = meter();

        let requests_total = meter
            .u64_counter("mailcheck.queue.requests.total")
            .with_description("Total number of requests reaching a terminal status")
            .build();

        let request_duration_seconds = meter
            .f64_histogram("mailcheck.queue.request.duration.seconds")
            .with_description("Distribution of end-to-end request durations")
            .build();

        let queued = Arc::new(AtomicU64::new(0));
        let processing = Arc::new(AtomicU64::new(0));
        let greylist_deferred = Arc::new(AtomicU64::new(0));
        let anti_greylist_backlog = Arc::new(AtomicU64::new(0));

        let queued_clone = queued.clone();
        let processing_clone = processing.clone();
        let greylist_clone = greylist_deferred.clone();
        let antigreylist_clone = anti_greylist_backlog.clone();
        meter
            .u64_observable_gauge("mailcheck.queue.depth")
            .with_description("Current queue depth by status")
            .with_callback(move |observer| {
                observer.observe(
                    queued_clone.load(Ordering::Relaxed),
                    &[KeyValue::new("status", "queued")],
                );
                observer.observe(
                    processing_clone.load(Ordering::Relaxed),
                    &[KeyValue::new("status", "processing")],
                );
                observer.observe(
                    greylist_clone.load(Ordering::Relaxed),
                    &[KeyValue::new("status", "greylist_deferred")],
                );
                observer.observe(
                    antigreylist_clone.load(Ordering::Relaxed),
                    &[KeyValue::new("status", "anti_greylist_backlog")],
                );
            })
            .build();

        Ok(Self {
            requests_total,
            request_duration_seconds,
            queued,
            processing,
            greylist_deferred,
            anti_greylist_backlog,
        })
    }

    /// Record a request reaching a terminal status (`"completed"` or
    /// `"failed"`), along with its total age in seconds.
    pub fn record_terminal(&self, status: &str, duration_secs: f64) {
        let attributes = [KeyValue::new("status", status.to_string())];
        self.requests_total.add(1, &attributes);
        self.request_duration_seconds.record(duration_secs, &attributes);
    }

    /// Set the current queue depth.
    pub fn set_queued(&self, depth: u64) {
        self.queued.store(depth, Ordering::Relaxed);
    }

    /// Set the number of requests currently assigned to a worker slot.
    pub fn set_processing(&self, depth: u64) {
        self.processing.store(depth, Ordering::Relaxed);
    }

    /// Set the number of archive entries awaiting a greylist retry.
    pub fn set_greylist_deferred(&self, depth: u64) {
        self.greylist_deferred.store(depth, Ordering::Relaxed);
    }

    /// Set the size of the anti-greylist retry backlog.
    pub fn set_anti_greylist_backlog(&self, depth: u64) {
        self.anti_greylist_backlog.store(depth, Ordering::Relaxed);
    }
}

/// Get the OpenTelemetry meter for queue metrics
fn meter() -> Meter {
    opentelemetry::global::meter("mailcheck.queue")
}
