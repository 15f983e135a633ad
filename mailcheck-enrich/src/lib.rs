//! A narrow, pluggable dispatch surface for per-email enrichments that sit
//! outside the core verification pipeline: disposable-domain list refresh,
//! Gravatar lookup, and the Microsoft/Yahoo login-page probes used as the
//! specialized path for those two providers.
//!
//! No enrichment here talks to the network. Each event has a registered
//! (or absent) handler that returns a merge delta; the verifier worker
//! applies whatever delta comes back, including an empty one when no
//! module is registered for the event. The live collaborators (an actual
//! Gravatar client, an actual login-page prober) are out of scope —
//! this crate is the seam they'd be wired in at.

pub mod delta;
pub mod event;
pub mod registry;

pub use delta::EnrichmentDelta;
pub use event::Event;
pub use registry::Registry;

#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("enrichment module failed: {0}")]
    ModuleFailed(String),
}

pub type Result<T> = std::result::Result<T, EnrichError>;
