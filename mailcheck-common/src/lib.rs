pub mod config;
pub mod domain;
pub mod email;
pub mod logging;

pub use domain::Domain;
pub use tracing;

/// Coordination signal threaded through the worker pool and controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
