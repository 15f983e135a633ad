//! Deferred requests waiting out an SMTP greylist window.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{OptionalExtension, params};

use crate::error::{Result, StoreError};
use crate::store::Store;
use crate::types::{AntiGreylistEntry, Request};

/// Base retry delay; doubles per attempt, capped at 4 hours.
const BASE_DELAY: Duration = Duration::minutes(5);
const MAX_DELAY: Duration = Duration::hours(4);
/// Attempts beyond this are exhausted and the entry should be dropped.
pub const MAX_ATTEMPTS: u32 = 10;

#[must_use]
pub fn backoff_for_attempt(attempt: u32) -> Duration {
    let multiplier = 1_i64 << attempt.min(16);
    (BASE_DELAY * multiplier as i32).min(MAX_DELAY)
}

fn row_to_entry(
    request_id: String,
    emails_json: String,
    response_url: Option<String>,
    attempts: u32,
    next_retry_at: String,
    created_at: String,
) -> Result<AntiGreylistEntry> {
    Ok(AntiGreylistEntry {
        request_id,
        emails: serde_json::from_str(&emails_json)?,
        response_url,
        attempts,
        next_retry_at: next_retry_at
            .parse::<DateTime<Utc>>()
            .map_err(|e| StoreError::Internal(format!("bad timestamp: {e}")))?,
        created_at: created_at
            .parse::<DateTime<Utc>>()
            .map_err(|e| StoreError::Internal(format!("bad timestamp: {e}")))?,
    })
}

impl Store {
    pub async fn antigreylist_exists(&self, request_id: &str) -> Result<bool> {
        let request_id = request_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT 1 FROM anti_greylist WHERE request_id = ?1",
                params![request_id],
                |_| Ok(()),
            )
            .optional()
        })
        .await
        .map(|row| row.is_some())
    }

    /// Upsert an entry: union the emails with any already deferred, and
    /// reset `next_retry_at` using the backoff schedule for the new attempt.
    pub async fn antigreylist_add(
        &self,
        request_id: &str,
        emails: &HashSet<String>,
        response_url: Option<String>,
    ) -> Result<()> {
        let existing = self.antigreylist_get(request_id).await?;

        let (merged_emails, attempts) = match existing {
            Some(entry) => {
                let mut merged = entry.emails;
                merged.extend(emails.iter().cloned());
                (merged, entry.attempts + 1)
            }
            None => (emails.clone(), 0),
        };

        let next_retry_at = (Utc::now() + backoff_for_attempt(attempts)).to_rfc3339();
        let emails_json = serde_json::to_string(&merged_emails)?;
        let request_id = request_id.to_string();
        let created_at = Utc::now().to_rfc3339();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO anti_greylist (request_id, emails, response_url, attempts, next_retry_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(request_id) DO UPDATE SET
                     emails = excluded.emails,
                     response_url = excluded.response_url,
                     attempts = excluded.attempts,
                     next_retry_at = excluded.next_retry_at",
                params![request_id, emails_json, response_url, attempts, next_retry_at, created_at],
            )
        })
        .await?;
        Ok(())
    }

    pub async fn antigreylist_get(&self, request_id: &str) -> Result<Option<AntiGreylistEntry>> {
        let request_id = request_id.to_string();
        let row = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT request_id, emails, response_url, attempts, next_retry_at, created_at
                     FROM anti_greylist WHERE request_id = ?1",
                    params![request_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, u32>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, String>(5)?,
                        ))
                    },
                )
                .optional()
            })
            .await?;

        row.map(|(id, emails, url, attempts, next, created)| {
            row_to_entry(id, emails, url, attempts, next, created)
        })
        .transpose()
    }

    /// Requests whose retry window has arrived; bumps `attempts` for each.
    /// Entries that have exhausted [`MAX_ATTEMPTS`] are dropped instead and
    /// excluded from the returned list — the caller should treat the
    /// archived partial as final.
    pub async fn antigreylist_try_ready(&self) -> Result<Vec<Request>> {
        let now = Utc::now().to_rfc3339();
        let ready = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT request_id, emails, response_url, attempts
                     FROM anti_greylist WHERE next_retry_at <= ?1",
                )?;
                let rows = stmt.query_map(params![now], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, u32>(3)?,
                    ))
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await?;

        let mut result = Vec::with_capacity(ready.len());
        for (request_id, emails_json, response_url, attempts) in ready {
            if attempts >= MAX_ATTEMPTS {
                self.antigreylist_clear(&request_id).await?;
                continue;
            }

            let emails: HashSet<String> = serde_json::from_str(&emails_json)?;
            result.push(Request {
                request_id,
                emails: emails.into_iter().collect(),
                response_url,
            });
        }

        Ok(result)
    }

    pub async fn antigreylist_clear(&self, request_id: &str) -> Result<()> {
        let request_id = request_id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM anti_greylist WHERE request_id = ?1", params![request_id])
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(backoff_for_attempt(0), Duration::minutes(5));
        assert_eq!(backoff_for_attempt(1), Duration::minutes(10));
        assert_eq!(backoff_for_attempt(2), Duration::minutes(20));
        assert_eq!(backoff_for_attempt(10), Duration::hours(4));
    }

    #[tokio::test]
    async fn test_add_and_exists() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(!store.antigreylist_exists("r1").await.unwrap());

        store
            .antigreylist_add("r1", &HashSet::from(["a@d".to_string()]), None)
            .await
            .unwrap();
        assert!(store.antigreylist_exists("r1").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_unions_emails_and_bumps_attempts() {
        let store = Store::open_in_memory().await.unwrap();
        store.antigreylist_add("r1", &HashSet::from(["a@d".to_string()]), None).await.unwrap();
        store.antigreylist_add("r1", &HashSet::from(["b@d".to_string()]), None).await.unwrap();

        let entry = store.antigreylist_get("r1").await.unwrap().unwrap();
        assert_eq!(entry.attempts, 1);
        assert!(entry.emails.contains("a@d"));
        assert!(entry.emails.contains("b@d"));
    }

    #[tokio::test]
    async fn test_try_ready_only_returns_due_entries() {
        let store = Store::open_in_memory().await.unwrap();
        store.antigreylist_add("r1", &HashSet::from(["a@d".to_string()]), None).await.unwrap();

        // Freshly-added entry isn't due for minutes.
        assert!(store.antigreylist_try_ready().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_removes_entry() {
        let store = Store::open_in_memory().await.unwrap();
        store.antigreylist_add("r1", &HashSet::from(["a@d".to_string()]), None).await.unwrap();
        store.antigreylist_clear("r1").await.unwrap();
        assert!(!store.antigreylist_exists("r1").await.unwrap());
    }
}
