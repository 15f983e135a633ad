//! MX resolution, behind a trait so the worker pipeline can be driven by a
//! mock resolver in tests instead of live DNS.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use hickory_resolver::TokioResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use mailcheck_store::MxRecord;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DnsError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    #[serde(default = "defaults::timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "defaults::cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "defaults::cache_size")]
    pub cache_size: usize,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: defaults::timeout_secs(),
            cache_ttl_secs: defaults::cache_ttl_secs(),
            cache_size: defaults::cache_size(),
        }
    }
}

mod defaults {
    pub const fn timeout_secs() -> u64 {
        10
    }
    pub const fn cache_ttl_secs() -> u64 {
        300
    }
    pub const fn cache_size() -> usize {
        1000
    }
}

/// Resolves a domain's mail exchangers within a bounded timeout budget.
#[async_trait::async_trait]
pub trait DnsResolver: Send + Sync {
    async fn resolve_mx(&self, domain: &str) -> Result<Vec<MxRecord>, DnsError>;
}

struct CachedResult {
    records: Arc<Vec<MxRecord>>,
    expires_at: Instant,
}

/// Production resolver: `hickory-resolver` with MX→A/AAAA fallback (RFC 5321
/// §5.1) and a bounded per-domain TTL cache.
pub struct HickoryDnsResolver {
    resolver: TokioResolver,
    cache: DashMap<String, CachedResult>,
    cache_cap: usize,
    cache_ttl: Duration,
}

impl HickoryDnsResolver {
    #[must_use]
    pub fn new(config: DnsConfig) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(config.timeout_secs);
        let mut builder = TokioResolver::builder_with_config(
            ResolverConfig::default(),
            TokioConnectionProvider::default(),
        );
        *builder.options_mut() = opts;
        Self {
            resolver: builder.build(),
            cache: DashMap::new(),
            cache_cap: config.cache_size.max(1),
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
        }
    }

    async fn resolve_uncached(&self, domain: &str) -> Result<Vec<MxRecord>, DnsError> {
        match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => {
                let mut records: Vec<MxRecord> = lookup
                    .iter()
                    .map(|mx| MxRecord { host: mx.exchange().to_utf8(), pref: mx.preference() })
                    .collect();
                if records.is_empty() {
                    return self.fallback_to_a_aaaa(domain).await;
                }
                records.sort_by_key(|r| r.pref);
                Ok(records)
            }
            Err(err) => {
                if matches!(
                    err.kind(),
                    hickory_resolver::ResolveErrorKind::Proto(proto) if proto.is_no_records_found()
                ) {
                    self.fallback_to_a_aaaa(domain).await
                } else {
                    warn!("MX lookup failed for {domain}: {err}");
                    Err(DnsError::LookupFailed { domain: domain.to_string(), source: err })
                }
            }
        }
    }

    async fn fallback_to_a_aaaa(&self, domain: &str) -> Result<Vec<MxRecord>, DnsError> {
        match self.resolver.lookup_ip(domain).await {
            Ok(lookup) => {
                let records: Vec<MxRecord> = lookup
                    .iter()
                    .map(|ip| MxRecord { host: ip.to_string(), pref: 0 })
                    .collect();
                if records.is_empty() {
                    Err(DnsError::NoMailServers(domain.to_string()))
                } else {
                    Ok(records)
                }
            }
            Err(err) if matches!(
                err.kind(),
                hickory_resolver::ResolveErrorKind::Proto(proto) if proto.is_no_records_found()
            ) => Err(DnsError::NoMailServers(domain.to_string())),
            Err(err) => Err(DnsError::LookupFailed { domain: domain.to_string(), source: err }),
        }
    }
}

#[async_trait::async_trait]
impl DnsResolver for HickoryDnsResolver {
    async fn resolve_mx(&self, domain: &str) -> Result<Vec<MxRecord>, DnsError> {
        if let Some(cached) = self.cache.get(domain) {
            if cached.expires_at > Instant::now() {
                debug!(domain, "mx cache hit");
                return Ok((*cached.records).clone());
            }
        }

        let records = Arc::new(self.resolve_uncached(domain).await?);

        if self.cache.len() >= self.cache_cap {
            if let Some(stale) = self.cache.iter().next().map(|e| e.key().clone()) {
                self.cache.remove(&stale);
            }
        }
        self.cache.insert(
            domain.to_string(),
            CachedResult { records: records.clone(), expires_at: Instant::now() + self.cache_ttl },
        );

        Ok((*records).clone())
    }
}

/// A deterministic resolver for tests: returns a fixed table, or
/// [`DnsError::NoMailServers`] for anything not in it.
#[derive(Default)]
pub struct MockDnsResolver {
    table: DashMap<String, Vec<MxRecord>>,
}

impl MockDnsResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, domain: impl Into<String>, records: Vec<MxRecord>) {
        self.table.insert(domain.into(), records);
    }
}

#[async_trait::async_trait]
impl DnsResolver for MockDnsResolver {
    async fn resolve_mx(&self, domain: &str) -> Result<Vec<MxRecord>, DnsError> {
        self.table
            .get(domain)
            .map(|r| r.clone())
            .ok_or_else(|| DnsError::NoMailServers(domain.to_string()))
    }
}

/// Races an MX resolution against a caller-supplied timeout budget.
///
/// # Errors
///
/// Returns [`DnsError::Timeout`] if the race loses, otherwise the
/// resolver's own error.
pub async fn resolve_with_timeout(
    resolver: &dyn DnsResolver,
    domain: &str,
    budget: Duration,
) -> Result<Vec<MxRecord>, DnsError> {
    tokio::time::timeout(budget, resolver.resolve_mx(domain))
        .await
        .map_err(|_| DnsError::Timeout(domain.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_resolver_hits_table() {
        let mock = MockDnsResolver::new();
        mock.insert("example.com", vec![MxRecord { host: "mx1.example.com".into(), pref: 10 }]);

        let records = mock.resolve_mx("example.com").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].host, "mx1.example.com");
    }

    #[tokio::test]
    async fn test_mock_resolver_missing_domain_errors() {
        let mock = MockDnsResolver::new();
        assert!(mock.resolve_mx("nowhere.tld").await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_with_timeout_races_slow_resolver() {
        struct SlowResolver;
        #[async_trait::async_trait]
        impl DnsResolver for SlowResolver {
            async fn resolve_mx(&self, _domain: &str) -> Result<Vec<MxRecord>, DnsError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(vec![])
            }
        }

        let result = resolve_with_timeout(&SlowResolver, "slow.tld", Duration::from_millis(10)).await;
        assert!(matches!(result, Err(DnsError::Timeout(_))));
    }
}
