//! Per-domain catch-all verdict cache.

use chrono::{DateTime, Duration, Utc};
use mailcheck_common::Domain;
use rusqlite::{OptionalExtension, params};

use crate::error::{Result, StoreError};
use crate::store::Store;

const TTL: Duration = Duration::hours(24);
const MIN_AGE: Duration = Duration::minutes(5);
const MIN_CONFIDENCE: u8 = 70;

impl Store {
    /// Record (or refresh) a catch-all verdict for `domain`.
    ///
    /// If a cached entry already exists: a higher incoming confidence
    /// replaces the stored verdict outright; otherwise the confidences are
    /// averaged. `test_count` always accumulates.
    pub async fn catchall_cache(
        &self,
        domain: &Domain,
        catch_all: bool,
        confidence: u8,
        test_count: u32,
    ) -> Result<()> {
        let existing = self.catchall_raw(domain).await?;

        let (final_catch_all, final_confidence, final_test_count) = match existing {
            Some((stored_catch_all, stored_confidence, stored_test_count, _, _)) => {
                if confidence > stored_confidence {
                    (catch_all, confidence, stored_test_count + test_count)
                } else {
                    (
                        stored_catch_all,
                        ((u16::from(stored_confidence) + u16::from(confidence)) / 2) as u8,
                        stored_test_count + test_count,
                    )
                }
            }
            None => (catch_all, confidence, test_count),
        };

        let domain_str = domain.as_str().to_string();
        let now = Utc::now();
        let expires_at = (now + TTL).to_rfc3339();
        let created_at = now.to_rfc3339();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO catch_all_cache (domain, catch_all, confidence, test_count, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(domain) DO UPDATE SET
                     catch_all = excluded.catch_all,
                     confidence = excluded.confidence,
                     test_count = excluded.test_count,
                     expires_at = excluded.expires_at",
                params![domain_str, final_catch_all, final_confidence, final_test_count, expires_at, created_at],
            )
        })
        .await?;
        Ok(())
    }

    async fn catchall_raw(
        &self,
        domain: &Domain,
    ) -> Result<Option<(bool, u8, u32, DateTime<Utc>, DateTime<Utc>)>> {
        let domain_str = domain.as_str().to_string();
        let row = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT catch_all, confidence, test_count, expires_at, created_at
                     FROM catch_all_cache WHERE domain = ?1",
                    params![domain_str],
                    |row| {
                        Ok((
                            row.get::<_, bool>(0)?,
                            row.get::<_, u8>(1)?,
                            row.get::<_, u32>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    },
                )
                .optional()
            })
            .await?;

        row.map(|(catch_all, confidence, test_count, expires_at, created_at)| {
            Ok((
                catch_all,
                confidence,
                test_count,
                expires_at
                    .parse::<DateTime<Utc>>()
                    .map_err(|e| StoreError::Internal(format!("bad timestamp: {e}")))?,
                created_at
                    .parse::<DateTime<Utc>>()
                    .map_err(|e| StoreError::Internal(format!("bad timestamp: {e}")))?,
            ))
        })
        .transpose()
    }

    /// Look up a usable cached verdict: present, not expired, at least
    /// [`MIN_AGE`] old, and at least [`MIN_CONFIDENCE`] confident. Returns
    /// `None` when no such verdict exists — callers must probe instead.
    pub async fn catchall_check(&self, domain: &Domain) -> Result<Option<bool>> {
        let Some((catch_all, confidence, _, expires_at, created_at)) = self.catchall_raw(domain).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        if now >= expires_at || now - created_at < MIN_AGE || confidence < MIN_CONFIDENCE {
            return Ok(None);
        }

        Ok(Some(catch_all))
    }

    pub async fn catchall_cleanup(&self) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM catch_all_cache WHERE expires_at <= ?1", params![now])
                .map(|n| n as u64)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_entry_not_usable_before_min_age() {
        let store = Store::open_in_memory().await.unwrap();
        let domain = Domain::new("example.com");
        store.catchall_cache(&domain, true, 95, 1).await.unwrap();

        assert_eq!(store.catchall_check(&domain).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_low_confidence_not_usable() {
        let store = Store::open_in_memory().await.unwrap();
        let domain = Domain::new("example.com");
        store.catchall_cache(&domain, true, 50, 1).await.unwrap();

        assert_eq!(store.catchall_raw(&domain).await.unwrap().unwrap().1, 50);
    }

    #[tokio::test]
    async fn test_update_averages_when_not_higher() {
        let store = Store::open_in_memory().await.unwrap();
        let domain = Domain::new("example.com");
        store.catchall_cache(&domain, true, 80, 1).await.unwrap();
        store.catchall_cache(&domain, false, 70, 1).await.unwrap();

        let (catch_all, confidence, test_count, _, _) = store.catchall_raw(&domain).await.unwrap().unwrap();
        assert!(catch_all); // stored verdict kept, confidence not higher
        assert_eq!(confidence, 75);
        assert_eq!(test_count, 2);
    }

    #[tokio::test]
    async fn test_update_replaces_when_higher() {
        let store = Store::open_in_memory().await.unwrap();
        let domain = Domain::new("example.com");
        store.catchall_cache(&domain, true, 70, 1).await.unwrap();
        store.catchall_cache(&domain, false, 95, 1).await.unwrap();

        let (catch_all, confidence, ..) = store.catchall_raw(&domain).await.unwrap().unwrap();
        assert!(!catch_all);
        assert_eq!(confidence, 95);
    }

    #[tokio::test]
    async fn test_cleanup_removes_expired() {
        let store = Store::open_in_memory().await.unwrap();
        let domain = Domain::new("example.com");
        store.catchall_cache(&domain, true, 95, 1).await.unwrap();

        // Force-expire by writing an already-past expiry directly.
        let past = (Utc::now() - Duration::hours(1)).to_rfc3339();
        store
            .with_conn(move |conn| {
                conn.execute(
                    "UPDATE catch_all_cache SET expires_at = ?1 WHERE domain = 'example.com'",
                    params![past],
                )
            })
            .await
            .unwrap();

        let removed = store.catchall_cleanup().await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.catchall_raw(&domain).await.unwrap().is_none());
    }
}
