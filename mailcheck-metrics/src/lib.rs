//! OpenTelemetry metrics for the mailcheck verification engine.
//!
//! Exports metrics via OTLP to an OpenTelemetry Collector, which can expose
//! them in Prometheus format for scraping.
//!
//! # Coverage
//!
//! - **Queue**: depth by request status, end-to-end request duration
//! - **Worker pool**: busy slots, idle-age restarts, assignment duration
//! - **Probe**: per-recipient outcomes, probe duration, catch-all cache rate
//! - **DNS**: lookup durations, cache hit rate, errors by kind
//! - **Webhook**: delivery outcomes, attempts used
//!
//! # Usage
//!
//! ```rust,no_run
//! use mailcheck_metrics::{init_metrics, MetricsConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MetricsConfig {
//!     enabled: true,
//!     endpoint: "http://localhost:4318".to_string(),
//!     max_domain_cardinality: 1000,
//!     tracked_domains: vec!["gmail.com".to_string(), "outlook.com".to_string()],
//! };
//!
//! init_metrics(&config)?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

mod config;
mod dns;
mod error;
mod exporter;
mod probe;
mod queue;
mod webhook;
mod worker;

pub use config::MetricsConfig;
pub use dns::DnsMetrics;
pub use error::MetricsError;
use once_cell::sync::OnceCell;
pub use probe::ProbeMetrics;
pub use queue::QueueMetrics;
pub use webhook::WebhookMetrics;
pub use worker::WorkerMetrics;

/// Global metrics instance
static METRICS_INSTANCE: OnceCell<Metrics> = OnceCell::new();

/// Root metrics container
#[derive(Debug)]
pub struct Metrics {
    pub queue: QueueMetrics,
    pub worker: WorkerMetrics,
    pub probe: ProbeMetrics,
    pub dns: DnsMetrics,
    pub webhook: WebhookMetrics,
}

/// Initialize the metrics system.
///
/// Must be called once at startup before any metrics are recorded. If
/// metrics are disabled in `config`, this is a no-op.
///
/// # Errors
///
/// Returns an error if metrics initialization fails or if called more than
/// once.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        tracing::info!("metrics collection disabled");
        return Ok(());
    }

    tracing::info!(endpoint = %config.endpoint, "initializing OpenTelemetry metrics");

    let provider = exporter::init_otlp_exporter(&config.endpoint)?;
    opentelemetry::global::set_meter_provider(provider);

    let metrics = Metrics {
        queue: QueueMetrics::new()?,
        worker: WorkerMetrics::new()?,
        probe: ProbeMetrics::new(config.max_domain_cardinality, config.tracked_domains.clone())?,
        dns: DnsMetrics::new()?,
        webhook: WebhookMetrics::new()?,
    };

    METRICS_INSTANCE
        .set(metrics)
        .map_err(|_| MetricsError::AlreadyInitialized)?;

    tracing::info!("metrics collection initialized");

    Ok(())
}

/// Get a reference to the global metrics instance.
///
/// # Panics
///
/// Panics if metrics have not been initialized via `init_metrics()`.
#[must_use]
pub fn metrics() -> &'static Metrics {
    METRICS_INSTANCE
        .get()
        .expect("metrics not initialized; call init_metrics() first")
}

/// Check whether metrics have been initialized.
#[must_use]
pub fn is_enabled() -> bool {
    METRICS_INSTANCE.get().is_some()
}
