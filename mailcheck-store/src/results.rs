//! The externally-visible status of a request.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use crate::error::{Result, StoreError};
use crate::store::Store;
use crate::types::{RequestStatus, ResultsRow, VerificationObj};

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    s.parse()
        .map_err(|e| StoreError::Internal(format!("bad timestamp: {e}")))
}

fn row_to_results(
    request_id: String,
    status: String,
    verifying: bool,
    greylist_found: bool,
    blacklist_found: bool,
    results_json: Option<String>,
    total_emails: u32,
    completed_emails: u32,
    webhook_sent: bool,
    webhook_attempts: u32,
    response_url: Option<String>,
    created_at: String,
    updated_at: String,
) -> Result<ResultsRow> {
    Ok(ResultsRow {
        request_id,
        status: RequestStatus::parse(&status)
            .ok_or_else(|| StoreError::Internal(format!("unknown status {status}")))?,
        verifying,
        greylist_found,
        blacklist_found,
        results: results_json.map(|s| serde_json::from_str(&s)).transpose()?,
        total_emails,
        completed_emails,
        webhook_sent,
        webhook_attempts,
        response_url,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

impl Store {
    /// Create (or reset) a results row as `queued`, used when a request
    /// first enters the system.
    pub async fn results_init(
        &self,
        request_id: &str,
        total_emails: u32,
        response_url: Option<String>,
    ) -> Result<()> {
        let request_id = request_id.to_string();
        let now = Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO results (
                     request_id, status, verifying, greylist_found, blacklist_found,
                     results, total_emails, completed_emails, webhook_sent, webhook_attempts,
                     response_url, created_at, updated_at
                 ) VALUES (?1, 'queued', 0, 0, 0, NULL, ?2, 0, 0, 0, ?3, ?4, ?4)
                 ON CONFLICT(request_id) DO NOTHING",
                params![request_id, total_emails, response_url, now],
            )
        })
        .await?;
        Ok(())
    }

    pub async fn results_mark_processing(&self, request_id: &str) -> Result<()> {
        let request_id = request_id.to_string();
        let now = Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE results SET status = 'processing', verifying = 1, updated_at = ?2
                 WHERE request_id = ?1",
                params![request_id, now],
            )
        })
        .await?;
        Ok(())
    }

    pub async fn results_mark_greylist_found(&self, request_id: &str) -> Result<()> {
        let request_id = request_id.to_string();
        let now = Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE results SET greylist_found = 1, updated_at = ?2 WHERE request_id = ?1",
                params![request_id, now],
            )
        })
        .await?;
        Ok(())
    }

    pub async fn results_mark_blacklist_found(&self, request_id: &str) -> Result<()> {
        let request_id = request_id.to_string();
        let now = Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE results SET blacklist_found = 1, updated_at = ?2 WHERE request_id = ?1",
                params![request_id, now],
            )
        })
        .await?;
        Ok(())
    }

    /// Persist the final result set and mark the request terminally complete.
    pub async fn results_complete(
        &self,
        request_id: &str,
        results: &[VerificationObj],
    ) -> Result<()> {
        let request_id = request_id.to_string();
        let results_json = serde_json::to_string(results)?;
        let completed = results.len() as u32;
        let now = Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE results SET
                     status = 'completed', verifying = 0,
                     results = ?2, completed_emails = ?3, updated_at = ?4
                 WHERE request_id = ?1",
                params![request_id, results_json, completed, now],
            )
        })
        .await?;
        Ok(())
    }

    /// Resets a request back to `queued`, used by startup recovery when
    /// re-queuing an orphaned request's unsettled emails.
    pub async fn results_reset_queued(&self, request_id: &str, total_emails: u32) -> Result<()> {
        let request_id = request_id.to_string();
        let now = Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE results SET status = 'queued', verifying = 0, total_emails = ?2, updated_at = ?3
                 WHERE request_id = ?1",
                params![request_id, total_emails, now],
            )
        })
        .await?;
        Ok(())
    }

    pub async fn results_mark_failed(&self, request_id: &str) -> Result<()> {
        let request_id = request_id.to_string();
        let now = Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE results SET status = 'failed', verifying = 0, updated_at = ?2
                 WHERE request_id = ?1",
                params![request_id, now],
            )
        })
        .await?;
        Ok(())
    }

    pub async fn results_record_webhook_attempt(&self, request_id: &str, sent: bool) -> Result<()> {
        let request_id = request_id.to_string();
        let now = Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE results SET
                     webhook_attempts = webhook_attempts + 1,
                     webhook_sent = webhook_sent OR ?2,
                     updated_at = ?3
                 WHERE request_id = ?1",
                params![request_id, sent, now],
            )
        })
        .await?;
        Ok(())
    }

    /// Marks a request's webhook as sent without counting an attempt, used
    /// when there is no `response_url` to deliver to at all.
    pub async fn results_mark_webhook_skipped(&self, request_id: &str) -> Result<()> {
        let request_id = request_id.to_string();
        let now = Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE results SET webhook_sent = 1, updated_at = ?2 WHERE request_id = ?1",
                params![request_id, now],
            )
        })
        .await?;
        Ok(())
    }

    pub async fn results_get(&self, request_id: &str) -> Result<Option<ResultsRow>> {
        let request_id = request_id.to_string();
        let row = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT request_id, status, verifying, greylist_found, blacklist_found,
                            results, total_emails, completed_emails, webhook_sent, webhook_attempts,
                            response_url, created_at, updated_at
                     FROM results WHERE request_id = ?1",
                    params![request_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, bool>(2)?,
                            row.get::<_, bool>(3)?,
                            row.get::<_, bool>(4)?,
                            row.get::<_, Option<String>>(5)?,
                            row.get::<_, u32>(6)?,
                            row.get::<_, u32>(7)?,
                            row.get::<_, bool>(8)?,
                            row.get::<_, u32>(9)?,
                            row.get::<_, Option<String>>(10)?,
                            row.get::<_, String>(11)?,
                            row.get::<_, String>(12)?,
                        ))
                    },
                )
                .optional()
            })
            .await?;

        row.map(
            |(id, status, verifying, gf, bf, results, total, completed, sent, attempts, url, created, updated)| {
                row_to_results(id, status, verifying, gf, bf, results, total, completed, sent, attempts, url, created, updated)
            },
        )
        .transpose()
    }

    /// Results rows eligible as startup-recovery orphan candidates:
    /// `queued`/`processing` and created within the last 7 days.
    pub async fn results_orphan_candidates(&self) -> Result<Vec<String>> {
        let cutoff = (Utc::now() - chrono::Duration::days(7)).to_rfc3339();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT request_id FROM results
                 WHERE status IN ('queued', 'processing') AND created_at > ?1",
            )?;
            let rows = stmt.query_map(params![cutoff], |row| row.get::<_, String>(0))?;
            rows.collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_then_get() {
        let store = Store::open_in_memory().await.unwrap();
        store.results_init("r1", 3, None).await.unwrap();

        let row = store.results_get("r1").await.unwrap().unwrap();
        assert_eq!(row.status, RequestStatus::Queued);
        assert_eq!(row.total_emails, 3);
        assert!(row.results.is_none());
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let store = Store::open_in_memory().await.unwrap();
        store.results_init("r1", 3, None).await.unwrap();
        store.results_mark_processing("r1").await.unwrap();
        store.results_init("r1", 99, None).await.unwrap();

        let row = store.results_get("r1").await.unwrap().unwrap();
        assert_eq!(row.status, RequestStatus::Processing);
        assert_eq!(row.total_emails, 3);
    }

    #[tokio::test]
    async fn test_complete_requires_results_present_invariant() {
        let store = Store::open_in_memory().await.unwrap();
        store.results_init("r1", 1, None).await.unwrap();
        store.results_mark_processing("r1").await.unwrap();

        let verdict = VerificationObj::unverified(
            "a@d",
            crate::types::SyntaxInfo { username: "a".into(), domain: "d".into(), valid: true },
        );
        store.results_complete("r1", &[verdict]).await.unwrap();

        let row = store.results_get("r1").await.unwrap().unwrap();
        assert_eq!(row.status, RequestStatus::Completed);
        assert!(row.results.is_some());
        assert_eq!(row.completed_emails, 1);
    }

    #[tokio::test]
    async fn test_webhook_attempt_tracking() {
        let store = Store::open_in_memory().await.unwrap();
        store.results_init("r1", 1, Some("https://example.com/hook".to_string())).await.unwrap();

        store.results_record_webhook_attempt("r1", false).await.unwrap();
        let row = store.results_get("r1").await.unwrap().unwrap();
        assert_eq!(row.webhook_attempts, 1);
        assert!(!row.webhook_sent);

        store.results_record_webhook_attempt("r1", true).await.unwrap();
        let row = store.results_get("r1").await.unwrap().unwrap();
        assert_eq!(row.webhook_attempts, 2);
        assert!(row.webhook_sent);
    }

    #[tokio::test]
    async fn test_reset_queued_clears_processing_state() {
        let store = Store::open_in_memory().await.unwrap();
        store.results_init("r1", 5, None).await.unwrap();
        store.results_mark_processing("r1").await.unwrap();

        store.results_reset_queued("r1", 2).await.unwrap();
        let row = store.results_get("r1").await.unwrap().unwrap();
        assert_eq!(row.status, RequestStatus::Queued);
        assert!(!row.verifying);
        assert_eq!(row.total_emails, 2);
    }

    #[tokio::test]
    async fn test_webhook_skipped_marks_sent_without_attempt() {
        let store = Store::open_in_memory().await.unwrap();
        store.results_init("r1", 1, None).await.unwrap();

        store.results_mark_webhook_skipped("r1").await.unwrap();
        let row = store.results_get("r1").await.unwrap().unwrap();
        assert!(row.webhook_sent);
        assert_eq!(row.webhook_attempts, 0);
    }
}
