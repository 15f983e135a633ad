//! Top-level process configuration: worker pool size, heartbeat period,
//! SMTP identity, and timing knobs.

use serde::{Deserialize, Serialize};

/// A process identity regenerated at every process start, used by startup
/// recovery to recognize that it is reconciling state left by a prior
/// incarnation of the process rather than its own in-memory state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerUuid(String);

impl ServerUuid {
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Size of the worker pool. Default: 4.
    #[serde(default = "defaults::thread_num")]
    pub thread_num: usize,

    /// Worker heartbeat period, in seconds. Default: 10.
    #[serde(default = "defaults::ping_freq_secs")]
    pub ping_freq_secs: u64,

    /// `EHLO` identity sent by the probe.
    pub mx_domain: String,

    /// Domain used to build the `MAIL FROM` address (`contact@<em_domain>`).
    pub em_domain: String,

    /// Idle worker recycle interval, in milliseconds. Default: 10 minutes.
    #[serde(default = "defaults::restart_after_ms")]
    pub restart_after_ms: u64,

    /// Base socket timeout, in milliseconds, from which stage-aware
    /// multipliers are derived. Default: 15000.
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    /// SMTP port dialed on every candidate MX host. Default: 25.
    #[serde(default = "defaults::smtp_port")]
    pub smtp_port: u16,

    /// Path to the embedded store's database file.
    #[serde(default = "defaults::db_path")]
    pub db_path: String,
}

impl AppConfig {
    /// Parse configuration from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document doesn't parse or required fields
    /// (`mx_domain`, `em_domain`) are missing.
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    #[must_use]
    pub fn probe_timeouts(&self) -> super::ProbeTimeouts {
        super::ProbeTimeouts {
            base_secs: self.timeout_ms / 1000,
            ..super::ProbeTimeouts::default()
        }
    }
}

mod defaults {
    pub const fn thread_num() -> usize {
        4
    }
    pub const fn ping_freq_secs() -> u64 {
        10
    }
    pub const fn restart_after_ms() -> u64 {
        10 * 60 * 1000
    }
    pub const fn timeout_ms() -> u64 {
        15_000
    }
    pub const fn smtp_port() -> u16 {
        25
    }
    pub fn db_path() -> String {
        "mailcheck.db".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_toml_applies_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            mx_domain = "mx.example.com"
            em_domain = "example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.thread_num, 4);
        assert_eq!(config.ping_freq_secs, 10);
        assert_eq!(config.smtp_port, 25);
        assert_eq!(config.mx_domain, "mx.example.com");
    }

    #[test]
    fn test_missing_required_field_errors() {
        assert!(AppConfig::from_toml_str("mx_domain = \"mx.example.com\"").is_err());
    }

    #[test]
    fn test_explicit_overrides_are_respected() {
        let config = AppConfig::from_toml_str(
            r#"
            mx_domain = "mx.example.com"
            em_domain = "example.com"
            thread_num = 8
            timeout_ms = 30000
            "#,
        )
        .unwrap();

        assert_eq!(config.thread_num, 8);
        assert_eq!(config.probe_timeouts().base_secs, 30);
    }

    #[test]
    fn test_server_uuid_regenerates_each_call() {
        let a = ServerUuid::generate();
        let b = ServerUuid::generate();
        assert_ne!(a, b);
    }
}
