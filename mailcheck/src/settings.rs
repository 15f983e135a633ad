//! Top-level settings file: process configuration plus the DNS resolver and
//! metrics export sections, loaded from one TOML document.

use std::path::{Path, PathBuf};

use mailcheck_common::config::AppConfig;
use mailcheck_metrics::MetricsConfig;
use mailcheck_verify::DnsConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(flatten)]
    pub app: AppConfig,

    #[serde(default)]
    pub dns: DnsConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Settings {
    /// Parse settings from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document doesn't parse or `AppConfig`'s
    /// required fields are missing.
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

/// Locate the settings file, checking in order: the `MAILCHECK_CONFIG`
/// environment variable, `./mailcheck.toml`, then
/// `/etc/mailcheck/mailcheck.toml`.
#[must_use]
pub fn find_config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("MAILCHECK_CONFIG") {
        return Some(PathBuf::from(path));
    }

    let cwd_config = Path::new("./mailcheck.toml");
    if cwd_config.exists() {
        return Some(cwd_config.to_path_buf());
    }

    let etc_config = Path::new("/etc/mailcheck/mailcheck.toml");
    if etc_config.exists() {
        return Some(etc_config.to_path_buf());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_minimal_document() {
        let settings = Settings::from_toml_str(
            r#"
            mx_domain = "mx.example.com"
            em_domain = "example.com"
            "#,
        )
        .expect("minimal settings should parse");

        assert_eq!(settings.app.thread_num, 4);
        assert_eq!(settings.dns.timeout_secs, 10);
        assert!(settings.metrics.enabled);
    }

    #[test]
    fn test_parses_full_document_with_overrides() {
        let settings = Settings::from_toml_str(
            r#"
            mx_domain = "mx.example.com"
            em_domain = "example.com"
            thread_num = 8
            db_path = "/var/lib/mailcheck/mailcheck.db"

            [dns]
            timeout_secs = 5
            cache_size = 5000

            [metrics]
            enabled = false
            "#,
        )
        .expect("full settings should parse");

        assert_eq!(settings.app.thread_num, 8);
        assert_eq!(settings.app.db_path, "/var/lib/mailcheck/mailcheck.db");
        assert_eq!(settings.dns.timeout_secs, 5);
        assert_eq!(settings.dns.cache_size, 5000);
        assert!(!settings.metrics.enabled);
    }
}
