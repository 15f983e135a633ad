//! DNS resolver metrics
//!
//! Tracks `DnsResolver` performance: MX/fallback lookup durations, cache
//! hit/miss rates, and lookup errors by kind.

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

use crate::MetricsError;

/// DNS metrics collector
#[derive(Debug)]
pub struct DnsMetrics {
    /// Distribution of lookup durations in seconds, by query type (`mx` or
    /// `a_fallback`)
    lookup_duration: Histogram<f64>,

    /// Total number of lookups by query type
    lookups_total: Counter<u64>,

    /// Total number of MX cache hits
    cache_hits: Counter<u64>,

    /// Total number of MX cache misses
    cache_misses: Counter<u64>,

    /// Total number of lookup errors by kind (`timeout`, `no_mail_servers`,
    /// `lookup_failed`)
    errors_total: Counter<u64>,
}

impl DnsMetrics {
    /// Create a new DNS metrics collector
    ///
    /// # Errors
    ///
    /// Returns an error if metric instruments cannot be created.
    pub fn new() -> Result<Self, MetricsError> {
        let meter = meter();

        let lookup_duration = meter
            .f64_histogram("mailcheck.dns.lookup.duration.seconds")
            .with_description("Distribution of DNS lookup durations")
            .build();

        let lookups_total = meter
            .u64_counter("mailcheck.dns.lookups.total")
            .with_description("Total number of DNS lookups by query type")
            .build();

        let cache_hits = meter
            .u64_counter("mailcheck.dns.cache.hits.total")
            .with_description("Total number of MX cache hits")
            .build();

        let cache_misses = meter
            .u64_counter("mailcheck.dns.cache.misses.total")
            .with_description("Total number of MX cache misses")
            .build();

        let errors_total = meter
            .u64_counter("mailcheck.dns.errors.total")
            .with_description("Total number of DNS errors by kind")
            .build();

        Ok(Self {
            lookup_duration,
            lookups_total,
            cache_hits,
            cache_misses,
            errors_total,
        })
    }

    /// Record a completed lookup of `query_type` (`"mx"` or `"a_fallback"`).
    pub fn record_lookup(&self, query_type: &str, duration_secs: f64) {
        let attributes = [KeyValue::new("query_type", query_type.to_string())];
        self.lookup_duration.record(duration_secs, &attributes);
        self.lookups_total.add(1, &attributes);
    }

    /// Record an MX cache hit.
    pub fn record_cache_hit(&self) {
        self.cache_hits.add(1, &[]);
    }

    /// Record an MX cache miss.
    pub fn record_cache_miss(&self) {
        self.cache_misses.add(1, &[]);
    }

    /// Record a lookup error of `kind`.
    pub fn record_error(&self, kind: &str) {
        let attributes = [KeyValue::new("kind", kind.to_string())];
        self.errors_total.add(1, &attributes);
    }
}

/// Get the OpenTelemetry meter for DNS metrics
fn meter() -> Meter {
    opentelemetry::global::meter("mailcheck.dns")
}
