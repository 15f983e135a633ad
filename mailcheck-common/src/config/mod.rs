//! Configuration types shared across the verification pipeline.
//!
//! - [`timeouts`]: per-stage timeout configuration for SMTP probing.
//! - [`app`]: top-level process configuration (worker pool, SMTP identity).

pub mod app;
pub mod timeouts;

pub use app::{AppConfig, ServerUuid};
pub use timeouts::{ProbeTimeouts, TimeoutConfig};
