//! Worker pool metrics
//!
//! Tracks the controller's fixed worker-slot pool: how many slots are busy,
//! how often a worker is recycled for sitting idle too long, and how long an
//! assignment takes end to end.

use std::sync::atomic::{AtomicU64, Ordering};

use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};

use crate::MetricsError;

/// Worker pool metrics collector
#[derive(Debug)]
pub struct WorkerMetrics {
    /// Number of worker slots currently assigned a request
    slots_busy: UpDownCounter<i64>,

    /// Total number of workers recycled by the idle-age restart policy
    restarts_total: Counter<u64>,

    /// Distribution of assignment durations, dispatch to report
    assignment_duration_seconds: Histogram<f64>,

    busy_count: AtomicU64,
}

impl WorkerMetrics {
    /// Create a new worker pool metrics collector
    ///
    /// # Errors
    ///
    /// Returns an error if metric instruments cannot be created.
    pub fn new() -> Result<Self, MetricsError> {
        let meter = meter();

        let slots_busy = meter
            .i64_up_down_counter("mailcheck.worker.slots.busy")
            .with_description("Number of worker slots currently assigned a request")
            .build();

        let restarts_total = meter
            .u64_counter("mailcheck.worker.restarts.total")
            .with_description("Total number of workers recycled by the idle-age restart policy")
            .build();

        let assignment_duration_seconds = meter
            .f64_histogram("mailcheck.worker.assignment.duration.seconds")
            .with_description("Distribution of assignment durations, dispatch to report")
            .build();

        Ok(Self {
            slots_busy,
            restarts_total,
            assignment_duration_seconds,
            busy_count: AtomicU64::new(0),
        })
    }

    /// Record a worker slot becoming busy with a freshly dispatched request.
    pub fn record_assigned(&self) {
        self.slots_busy.add(1, &[]);
        self.busy_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a worker slot freeing up, along with how long the assignment
    /// took.
    pub fn record_freed(&self, duration_secs: f64) {
        self.slots_busy.add(-1, &[]);
        self.busy_count.fetch_sub(1, Ordering::Relaxed);
        self.assignment_duration_seconds.record(duration_secs, &[]);
    }

    /// Record a worker being recycled for sitting idle too long.
    pub fn record_restart(&self) {
        self.restarts_total.add(1, &[]);
    }

    /// Number of worker slots currently busy.
    #[must_use]
    pub fn busy_slots(&self) -> u64 {
        self.busy_count.load(Ordering::Relaxed)
    }
}

/// Get the OpenTelemetry meter for worker pool metrics
fn meter() -> Meter {
    opentelemetry::global::meter("mailcheck.worker")
}
