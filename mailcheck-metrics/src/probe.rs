//! SMTP probe metrics
//!
//! Tracks the outcome of `mailcheck_smtp::probe::check` runs: per-recipient
//! verdicts, probe durations, catch-all cache effectiveness, and the
//! reconnect/relay-block pressure a run hits against a given MX host.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashSet;
use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

use crate::MetricsError;

/// Probe metrics collector
#[derive(Debug)]
pub struct ProbeMetrics {
    /// Total number of per-recipient probe outcomes, by outcome label
    outcomes_total: Counter<u64>,

    /// Distribution of probe durations per MX host
    duration_seconds: Histogram<f64>,

    /// Total number of catch-all cache hits
    catch_all_cache_hits: Counter<u64>,

    /// Total number of catch-all cache misses
    catch_all_cache_misses: Counter<u64>,

    /// Total number of MX reconnect attempts
    reconnects_total: Counter<u64>,

    /// Total number of relay-block skips, by domain label
    relay_blocks_total: Counter<u64>,

    tracked_domains: DashSet<String>,
    max_domain_cardinality: usize,
    seen_domains: DashSet<String>,
    other_domain_count: AtomicU64,
}

impl ProbeMetrics {
    /// Create a new probe metrics collector.
    ///
    /// `tracked_domains` bypass the cardinality cap and always get their own
    /// label; any other domain beyond `max_domain_cardinality` distinct
    /// values is folded into an `"other"` bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if metric instruments cannot be created.
    pub fn new(
        max_domain_cardinality: usize,
        tracked_domains: Vec<String>,
    ) -> Result<Self, MetricsError> {
        let meter = meter();

        let outcomes_total = meter
            .u64_counter("mailcheck.probe.outcomes.total")
            .with_description("Total number of per-recipient probe outcomes by outcome label")
            .build();

        let duration_seconds = meter
            .f64_histogram("mailcheck.probe.duration.seconds")
            .with_description("Distribution of probe durations per MX host")
            .build();

        let catch_all_cache_hits = meter
            .u64_counter("mailcheck.probe.catch_all_cache.hits.total")
            .with_description("Total number of catch-all cache hits")
            .build();

        let catch_all_cache_misses = meter
            .u64_counter("mailcheck.probe.catch_all_cache.misses.total")
            .with_description("Total number of catch-all cache misses")
            .build();

        let reconnects_total = meter
            .u64_counter("mailcheck.probe.reconnects.total")
            .with_description("Total number of MX reconnect attempts")
            .build();

        let relay_blocks_total = meter
            .u64_counter("mailcheck.probe.relay_blocks.total")
            .with_description("Total number of domain relay-block skips")
            .build();

        Ok(Self {
            outcomes_total,
            duration_seconds,
            catch_all_cache_hits,
            catch_all_cache_misses,
            reconnects_total,
            relay_blocks_total,
            tracked_domains: tracked_domains.into_iter().collect(),
            max_domain_cardinality: max_domain_cardinality.max(1),
            seen_domains: DashSet::new(),
            other_domain_count: AtomicU64::new(0),
        })
    }

    /// Maps `domain` to the label that should be used for a metric
    /// attribute, folding overflow domains into `"other"` once
    /// `max_domain_cardinality` distinct domains have been observed.
    fn domain_label(&self, domain: &str) -> String {
        if self.tracked_domains.contains(domain) || self.seen_domains.contains(domain) {
            return domain.to_string();
        }

        if self.seen_domains.len() < self.max_domain_cardinality {
            self.seen_domains.insert(domain.to_string());
            domain.to_string()
        } else {
            self.other_domain_count.fetch_add(1, Ordering::Relaxed);
            "other".to_string()
        }
    }

    /// Record one per-recipient probe outcome for `domain`.
    pub fn record_outcome(&self, domain: &str, outcome: &str) {
        let attributes = [
            KeyValue::new("domain", self.domain_label(domain)),
            KeyValue::new("outcome", outcome.to_string()),
        ];
        self.outcomes_total.add(1, &attributes);
    }

    /// Record the wall-clock duration of one probe run against `mx_host`.
    pub fn record_duration(&self, mx_host: &str, duration_secs: f64) {
        let attributes = [KeyValue::new("mx_host", mx_host.to_string())];
        self.duration_seconds.record(duration_secs, &attributes);
    }

    /// Record a catch-all cache lookup for `domain`.
    pub fn record_catch_all_cache(&self, hit: bool) {
        if hit {
            self.catch_all_cache_hits.add(1, &[]);
        } else {
            self.catch_all_cache_misses.add(1, &[]);
        }
    }

    /// Record one reconnect attempt against `mx_host`.
    pub fn record_reconnect(&self, mx_host: &str) {
        let attributes = [KeyValue::new("mx_host", mx_host.to_string())];
        self.reconnects_total.add(1, &attributes);
    }

    /// Record one relay-block skip for `domain`.
    pub fn record_relay_block(&self, domain: &str) {
        let attributes = [KeyValue::new("domain", self.domain_label(domain))];
        self.relay_blocks_total.add(1, &attributes);
    }

    /// Number of distinct domains folded into the `"other"` bucket so far.
    #[must_use]
    pub fn overflowed_domain_observations(&self) -> u64 {
        self.other_domain_count.load(Ordering::Relaxed)
    }
}

/// Get the OpenTelemetry meter for probe metrics
fn meter() -> Meter {
    opentelemetry::global::meter("mailcheck.probe")
}
