//! Webhook delivery metrics
//!
//! Tracks completion-webhook POSTs back to a request's `response_url`:
//! attempts, final outcome, and the linear-backoff retry count actually
//! used before success or exhaustion.

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

use crate::MetricsError;

/// Webhook delivery metrics collector
#[derive(Debug)]
pub struct WebhookMetrics {
    /// Total number of webhook deliveries by final outcome (`"delivered"`,
    /// `"exhausted"`, `"skipped"`)
    deliveries_total: Counter<u64>,

    /// Distribution of attempts used before a webhook delivery settled
    attempts_used: Histogram<u64>,
}

impl WebhookMetrics {
    /// Create a new webhook metrics collector
    ///
    /// # Errors
    ///
    /// Returns an error if metric instruments cannot be created.
    pub fn new() -> Result<Self, MetricsError> {
        let meter = meter();

        let deliveries_total = meter
            .u64_counter("mailcheck.webhook.deliveries.total")
            .with_description("Total number of webhook deliveries by final outcome")
            .build();

        let attempts_used = meter
            .u64_histogram("mailcheck.webhook.attempts.used")
            .with_description("Distribution of attempts used before a webhook delivery settled")
            .build();

        Ok(Self { deliveries_total, attempts_used })
    }

    /// Record a webhook delivery settling with `outcome` after `attempts`
    /// POST attempts.
    pub fn record_settled(&self, outcome: &str, attempts: u64) {
        let attributes = [KeyValue::new("outcome", outcome.to_string())];
        self.deliveries_total.add(1, &attributes);
        self.attempts_used.record(attempts, &[]);
    }

    /// Record a request whose webhook was skipped for lacking a
    /// `response_url`.
    pub fn record_skipped(&self) {
        self.deliveries_total.add(1, &[KeyValue::new("outcome", "skipped")]);
    }
}

/// Get the OpenTelemetry meter for webhook metrics
fn meter() -> Meter {
    opentelemetry::global::meter("mailcheck.webhook")
}
