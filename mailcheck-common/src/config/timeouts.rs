//! Per-stage timeout configuration for SMTP probing.
//!
//! A probe session walks through several SMTP stages (connect, EHLO,
//! MAIL FROM, RCPT TO, QUIT). Each stage has its own allowance, derived
//! from a single configurable base so operators can tune probe latency
//! with one knob instead of five.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Common interface for timeout configuration.
pub trait TimeoutConfig {
    /// Timeout for an individual SMTP command round-trip.
    fn command_timeout(&self) -> Duration;

    /// Maximum duration of the whole probe session.
    fn connection_timeout(&self) -> Duration;
}

/// Timeouts for a single probe session against a candidate MX host.
///
/// Every stage timeout is a multiplier of `base_secs`, matching the
/// relative weighting of a probe's stages: greeting and `EHLO` need the
/// full allowance, `MAIL FROM`/`RCPT TO` are given headroom for
/// greylisting-induced delay, and `QUIT` is best-effort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeTimeouts {
    /// Base timeout in seconds. Default: 15.
    #[serde(default = "defaults::base_secs")]
    pub base_secs: u64,

    /// Timeout for establishing the TCP (or TLS) connection.
    ///
    /// Default: `base_secs` (1.0x).
    #[serde(default = "defaults::connect_multiplier")]
    pub connect_multiplier: f64,

    /// Timeout for the `EHLO`/`HELO` exchange.
    ///
    /// Default: 1.2x `base_secs`.
    #[serde(default = "defaults::ehlo_multiplier")]
    pub ehlo_multiplier: f64,

    /// Timeout for `MAIL FROM`.
    ///
    /// Default: 1.2x `base_secs`.
    #[serde(default = "defaults::mail_from_multiplier")]
    pub mail_from_multiplier: f64,

    /// Timeout for `RCPT TO`.
    ///
    /// Default: 1.2x `base_secs`.
    #[serde(default = "defaults::rcpt_to_multiplier")]
    pub rcpt_to_multiplier: f64,

    /// Timeout for `QUIT`. The probe doesn't fail if this elapses.
    ///
    /// Default: 0.5x `base_secs`.
    #[serde(default = "defaults::quit_multiplier")]
    pub quit_multiplier: f64,
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        Self {
            base_secs: defaults::base_secs(),
            connect_multiplier: defaults::connect_multiplier(),
            ehlo_multiplier: defaults::ehlo_multiplier(),
            mail_from_multiplier: defaults::mail_from_multiplier(),
            rcpt_to_multiplier: defaults::rcpt_to_multiplier(),
            quit_multiplier: defaults::quit_multiplier(),
        }
    }
}

impl ProbeTimeouts {
    fn scaled(&self, multiplier: f64) -> Duration {
        Duration::from_secs_f64(self.base_secs as f64 * multiplier)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.scaled(self.connect_multiplier)
    }

    #[must_use]
    pub fn ehlo_timeout(&self) -> Duration {
        self.scaled(self.ehlo_multiplier)
    }

    #[must_use]
    pub fn mail_from_timeout(&self) -> Duration {
        self.scaled(self.mail_from_multiplier)
    }

    #[must_use]
    pub fn rcpt_to_timeout(&self) -> Duration {
        self.scaled(self.rcpt_to_multiplier)
    }

    #[must_use]
    pub fn quit_timeout(&self) -> Duration {
        self.scaled(self.quit_multiplier)
    }
}

impl TimeoutConfig for ProbeTimeouts {
    fn command_timeout(&self) -> Duration {
        self.ehlo_timeout()
    }

    fn connection_timeout(&self) -> Duration {
        self.connect_timeout()
            + self.ehlo_timeout()
            + self.mail_from_timeout()
            + self.rcpt_to_timeout()
            + self.quit_timeout()
    }
}

mod defaults {
    pub const fn base_secs() -> u64 {
        15
    }
    pub const fn connect_multiplier() -> f64 {
        1.0
    }
    pub const fn ehlo_multiplier() -> f64 {
        1.2
    }
    pub const fn mail_from_multiplier() -> f64 {
        1.2
    }
    pub const fn rcpt_to_multiplier() -> f64 {
        1.2
    }
    pub const fn quit_multiplier() -> f64 {
        0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_timeouts_defaults() {
        let timeouts = ProbeTimeouts::default();
        assert_eq!(timeouts.base_secs, 15);
        assert_eq!(timeouts.ehlo_multiplier, 1.2);
        assert_eq!(timeouts.quit_multiplier, 0.5);
    }

    #[test]
    fn test_probe_timeouts_scaling() {
        let timeouts = ProbeTimeouts::default();
        assert_eq!(timeouts.connect_timeout(), Duration::from_secs_f64(15.0));
        assert_eq!(timeouts.ehlo_timeout(), Duration::from_secs_f64(18.0));
        assert_eq!(timeouts.mail_from_timeout(), Duration::from_secs_f64(18.0));
        assert_eq!(timeouts.rcpt_to_timeout(), Duration::from_secs_f64(18.0));
        assert_eq!(timeouts.quit_timeout(), Duration::from_secs_f64(7.5));
    }

    #[test]
    fn test_timeout_config_trait() {
        let timeouts = ProbeTimeouts::default();
        assert_eq!(timeouts.command_timeout(), timeouts.ehlo_timeout());
        assert_eq!(
            timeouts.connection_timeout(),
            timeouts.connect_timeout()
                + timeouts.ehlo_timeout()
                + timeouts.mail_from_timeout()
                + timeouts.rcpt_to_timeout()
                + timeouts.quit_timeout()
        );
    }

    #[test]
    fn test_custom_base_rescales_all_stages() {
        let timeouts = ProbeTimeouts {
            base_secs: 30,
            ..ProbeTimeouts::default()
        };
        assert_eq!(timeouts.ehlo_timeout(), Duration::from_secs_f64(36.0));
    }
}
