//! In-flight partial results waiting for a request to fully settle.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{OptionalExtension, params};

use crate::error::{Result, StoreError};
use crate::store::Store;
use crate::types::{ArchiveEntry, VerificationObj};

fn row_to_entry(
    request_id: String,
    emails_json: String,
    response_url: Option<String>,
    partial_json: String,
    created_at: String,
) -> Result<ArchiveEntry> {
    Ok(ArchiveEntry {
        request_id,
        emails: serde_json::from_str(&emails_json)?,
        response_url,
        partial_result: serde_json::from_str(&partial_json)?,
        created_at: created_at
            .parse::<DateTime<Utc>>()
            .map_err(|e| StoreError::Internal(format!("bad timestamp: {e}")))?,
    })
}

impl Store {
    pub async fn archive_get(&self, request_id: &str) -> Result<Option<ArchiveEntry>> {
        let request_id = request_id.to_string();
        let row = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT request_id, emails, response_url, partial_result, created_at
                     FROM archive WHERE request_id = ?1",
                    params![request_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    },
                )
                .optional()
            })
            .await?;

        row.map(|(id, emails, url, partial, created_at)| {
            row_to_entry(id, emails, url, partial, created_at)
        })
        .transpose()
    }

    /// Merge `delta` into the archive entry for `request_id`, creating it if
    /// absent. `archive_wins` selects the merge precedence: `true` keeps the
    /// existing verdict for emails present in both (terminal merge), `false`
    /// lets `delta` overwrite (greylist-deferral merge).
    pub async fn archive_merge(
        &self,
        request_id: &str,
        emails: &[String],
        response_url: Option<String>,
        delta: std::collections::HashMap<String, VerificationObj>,
        archive_wins: bool,
    ) -> Result<()> {
        let existing = self.archive_get(request_id).await?;

        let mut entry = existing.unwrap_or_else(|| ArchiveEntry {
            request_id: request_id.to_string(),
            emails: emails.to_vec(),
            response_url: response_url.clone(),
            partial_result: std::collections::HashMap::new(),
            created_at: Utc::now(),
        });

        if archive_wins {
            entry.merge_archive_wins(delta);
        } else {
            entry.merge_fresh_wins(delta);
        }

        let emails_json = serde_json::to_string(&entry.emails)?;
        let partial_json = serde_json::to_string(&entry.partial_result)?;
        let created_at = entry.created_at.to_rfc3339();
        let request_id = request_id.to_string();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO archive (request_id, emails, response_url, partial_result, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(request_id) DO UPDATE SET
                     emails = excluded.emails,
                     response_url = excluded.response_url,
                     partial_result = excluded.partial_result",
                params![request_id, emails_json, response_url, partial_json, created_at],
            )
        })
        .await?;
        Ok(())
    }

    pub async fn archive_delete(&self, request_id: &str) -> Result<()> {
        let request_id = request_id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM archive WHERE request_id = ?1", params![request_id])
        })
        .await?;
        Ok(())
    }

    /// Tiered cleanup: drop archive rows for completed requests older than
    /// 24h, and any archive row older than 7 days regardless of status.
    pub async fn archive_cleanup(&self) -> Result<u64> {
        let tier1_cutoff = (Utc::now() - Duration::hours(24)).to_rfc3339();
        let tier2_cutoff = (Utc::now() - Duration::days(7)).to_rfc3339();

        self.with_conn(move |conn| {
            let tier1 = conn.execute(
                "DELETE FROM archive WHERE request_id IN (
                     SELECT a.request_id FROM archive a
                     JOIN results r ON r.request_id = a.request_id
                     WHERE r.status = 'completed' AND r.updated_at < ?1
                 )",
                params![tier1_cutoff],
            )?;
            let tier2 = conn.execute("DELETE FROM archive WHERE created_at < ?1", params![tier2_cutoff])?;
            Ok((tier1 + tier2) as u64)
        })
        .await
    }

    /// All archive entries, used to rebuild the in-memory mirror at startup.
    pub async fn archive_all(&self) -> Result<Vec<ArchiveEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT request_id, emails, response_url, partial_result, created_at FROM archive",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await?
        .into_iter()
        .map(|(id, emails, url, partial, created_at)| row_to_entry(id, emails, url, partial, created_at))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Reachable, SyntaxInfo};

    fn obj(email: &str, reachable: Reachable) -> VerificationObj {
        let mut v = VerificationObj::unverified(
            email,
            SyntaxInfo { username: "u".into(), domain: "d".into(), valid: true },
        );
        v.reachable = reachable;
        v
    }

    #[tokio::test]
    async fn test_merge_creates_entry() {
        let store = Store::open_in_memory().await.unwrap();
        let delta = std::collections::HashMap::from([("a@d".to_string(), obj("a@d", Reachable::Yes))]);
        store
            .archive_merge("r1", &["a@d".to_string()], None, delta, false)
            .await
            .unwrap();

        let entry = store.archive_get("r1").await.unwrap().unwrap();
        assert_eq!(entry.partial_result.len(), 1);
    }

    #[tokio::test]
    async fn test_fresh_wins_overwrites() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .archive_merge(
                "r1",
                &["a@d".to_string()],
                None,
                std::collections::HashMap::from([("a@d".to_string(), obj("a@d", Reachable::Unknown))]),
                false,
            )
            .await
            .unwrap();
        store
            .archive_merge(
                "r1",
                &["a@d".to_string()],
                None,
                std::collections::HashMap::from([("a@d".to_string(), obj("a@d", Reachable::Yes))]),
                false,
            )
            .await
            .unwrap();

        let entry = store.archive_get("r1").await.unwrap().unwrap();
        assert_eq!(entry.partial_result["a@d"].reachable, Reachable::Yes);
    }

    #[tokio::test]
    async fn test_archive_wins_keeps_existing() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .archive_merge(
                "r1",
                &["a@d".to_string()],
                None,
                std::collections::HashMap::from([("a@d".to_string(), obj("a@d", Reachable::Yes))]),
                false,
            )
            .await
            .unwrap();
        store
            .archive_merge(
                "r1",
                &["a@d".to_string()],
                None,
                std::collections::HashMap::from([("a@d".to_string(), obj("a@d", Reachable::Unknown))]),
                true,
            )
            .await
            .unwrap();

        let entry = store.archive_get("r1").await.unwrap().unwrap();
        assert_eq!(entry.partial_result["a@d"].reachable, Reachable::Yes);
    }

    #[tokio::test]
    async fn test_delete_removes_entry() {
        let store = Store::open_in_memory().await.unwrap();
        store.archive_merge("r1", &[], None, std::collections::HashMap::new(), false).await.unwrap();
        store.archive_delete("r1").await.unwrap();
        assert!(store.archive_get("r1").await.unwrap().is_none());
    }
}
