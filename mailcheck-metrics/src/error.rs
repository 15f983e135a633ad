//! Error types for metrics operations

use thiserror::Error;

/// Errors that can occur during metrics operations
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Metrics system has already been initialized
    #[error("metrics system already initialized")]
    AlreadyInitialized,

    /// OpenTelemetry SDK error
    #[error("opentelemetry error: {0}")]
    OpenTelemetry(String),
}
