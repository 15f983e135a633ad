//! Module registry: dispatches [`Event`]s to whichever handler, if any, is
//! registered for that event's kind.

use crate::{EnrichmentDelta, Event, Result};

/// An enrichment module. Implementors decide which event kinds they
/// respond to by returning `None` from [`handle`](Enricher::handle) for
/// anything else.
#[async_trait::async_trait]
pub trait Enricher: Send + Sync {
    async fn handle(&self, event: &Event) -> Result<Option<EnrichmentDelta>>;
}

/// An ordered list of enrichment modules. Dispatch stops at the first
/// module that returns `Some`; an event nobody handles yields an empty
/// delta rather than an error.
#[derive(Default)]
pub struct Registry {
    modules: Vec<Box<dyn Enricher>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: Box<dyn Enricher>) {
        self.modules.push(module);
    }

    /// Dispatch `event` to the first registered module that handles it.
    ///
    /// # Errors
    ///
    /// Returns an error only if a module that claims the event fails.
    pub async fn dispatch(&self, event: &Event) -> Result<EnrichmentDelta> {
        for module in &self.modules {
            if let Some(delta) = module.handle(event).await? {
                return Ok(delta);
            }
        }
        tracing::trace!(event = event.name(), "no module handled enrichment event");
        Ok(EnrichmentDelta::empty())
    }
}
