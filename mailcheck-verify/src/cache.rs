//! In-memory catch-all cache consulted synchronously by the SMTP probe
//! (`mailcheck_smtp::CatchAllCache`), backed by the durable `mailcheck-store`
//! table. The probe loop is synchronous per recipient and cannot await a
//! database round trip mid-session, so the worker hydrates this cache before
//! a probe batch and flushes new verdicts back to the store after.

use dashmap::DashMap;
use mailcheck_smtp::CatchAllCache;

#[derive(Debug, Clone, Copy)]
struct Verdict {
    catch_all: bool,
    confidence: u8,
}

/// A snapshot of durable catch-all verdicts, plus any verdicts recorded
/// during the current probe run, ready to flush back to the store.
#[derive(Default)]
pub struct WorkerCatchAllCache {
    known: DashMap<String, Verdict>,
    fresh: DashMap<String, Verdict>,
}

impl WorkerCatchAllCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a verdict known to be usable (already passed the store's
    /// min-age/min-confidence gate) before a probe run starts.
    pub fn seed(&self, domain: impl Into<String>, catch_all: bool, confidence: u8) {
        self.known.insert(domain.into(), Verdict { catch_all, confidence });
    }

    /// Verdicts recorded by the probe this run, to be persisted by the
    /// caller via `Store::catchall_cache`.
    #[must_use]
    pub fn drain_fresh(&self) -> Vec<(String, bool, u8)> {
        self.fresh
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().catch_all, entry.value().confidence))
            .collect()
    }
}

impl CatchAllCache for WorkerCatchAllCache {
    fn check(&self, domain: &str) -> Option<bool> {
        self.known.get(domain).map(|v| v.catch_all).or_else(|| self.fresh.get(domain).map(|v| v.catch_all))
    }

    fn record(&self, domain: &str, catch_all: bool, confidence: u8) {
        self.fresh.insert(domain.to_string(), Verdict { catch_all, confidence });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_verdict_is_visible_to_probe() {
        let cache = WorkerCatchAllCache::new();
        cache.seed("example.com", true, 95);
        assert_eq!(cache.check("example.com"), Some(true));
    }

    #[test]
    fn test_recorded_verdict_is_queued_for_flush() {
        let cache = WorkerCatchAllCache::new();
        cache.record("fresh.com", false, 90);
        assert_eq!(cache.check("fresh.com"), Some(false));

        let flushed = cache.drain_fresh();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0], ("fresh.com".to_string(), false, 90));
    }

    #[test]
    fn test_unknown_domain_misses() {
        let cache = WorkerCatchAllCache::new();
        assert_eq!(cache.check("unknown.com"), None);
    }
}
