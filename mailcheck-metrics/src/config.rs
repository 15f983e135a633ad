//! Metrics configuration

use serde::Deserialize;

/// Configuration for metrics collection and export
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Enable or disable metrics collection
    ///
    /// When disabled, `init_metrics` is a no-op and `is_enabled()` reports `false`.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// OTLP endpoint URL for metrics export
    ///
    /// Metrics are pushed to this endpoint over OTLP/HTTP, typically an
    /// OpenTelemetry Collector that re-exposes them for Prometheus to scrape.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Maximum number of unique domains tracked individually in per-domain
    /// probe and webhook metrics.
    ///
    /// A bulk verification run can touch thousands of distinct recipient
    /// domains; labelling every one would explode metric cardinality. Once
    /// this limit is reached, further domains are folded into an `"other"`
    /// bucket.
    #[serde(default = "default_max_domain_cardinality")]
    pub max_domain_cardinality: usize,

    /// Domains that bypass the cardinality limit and are always tracked
    /// individually, e.g. the major providers a deployment cares most about.
    #[serde(default)]
    pub tracked_domains: Vec<String>,
}

const fn default_enabled() -> bool {
    true
}

fn default_endpoint() -> String {
    "http://localhost:4318/v1/metrics".to_string()
}

const fn default_max_domain_cardinality() -> usize {
    1000
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            endpoint: default_endpoint(),
            max_domain_cardinality: default_max_domain_cardinality(),
            tracked_domains: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_enabled_with_local_endpoint() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert_eq!(config.endpoint, "http://localhost:4318/v1/metrics");
        assert_eq!(config.max_domain_cardinality, 1000);
        assert!(config.tracked_domains.is_empty());
    }

    #[test]
    fn test_deserializes_with_partial_fields() {
        let config: MetricsConfig = serde_json::from_str(r#"{"enabled": false}"#).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.endpoint, default_endpoint());
    }
}
