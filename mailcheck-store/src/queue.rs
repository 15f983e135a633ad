//! Ordered, durable, deduplicated intake of requests.

use rusqlite::{OptionalExtension, params};

use crate::error::Result;
use crate::store::Store;
use crate::types::Request;

/// Outcome of [`Store::queue_add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    pub success: bool,
    pub reason: &'static str,
}

impl Store {
    /// Insert a request at the tail of the queue. Duplicate `request_id`s
    /// are treated as an idempotent success, not an error.
    pub async fn queue_add(&self, request: Request) -> Result<AddOutcome> {
        let emails = serde_json::to_string(&request.emails)?;
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO queue (request_id, emails, response_url, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    request.request_id,
                    emails,
                    request.response_url,
                    chrono::Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(inserted)
        })
        .await
        .map(|inserted| {
            if inserted > 0 {
                AddOutcome { success: true, reason: "queued" }
            } else {
                AddOutcome { success: true, reason: "already queued" }
            }
        })
    }

    /// Peek at the head of the queue without removing it.
    pub async fn queue_current(&self) -> Result<Option<Request>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT request_id, emails, response_url FROM queue ORDER BY position ASC LIMIT 1",
                [],
                |row| {
                    let emails_json: String = row.get(1)?;
                    Ok((row.get::<_, String>(0)?, emails_json, row.get::<_, Option<String>>(2)?))
                },
            )
            .optional()
        })
        .await?
        .map(|(request_id, emails_json, response_url)| {
            let emails = serde_json::from_str(&emails_json)?;
            Ok(Some(Request { request_id, emails, response_url }))
        })
        .unwrap_or(Ok(None))
    }

    /// Remove the head of the queue iff it matches `request_id`.
    pub async fn queue_done(&self, request_id: &str) -> Result<()> {
        let request_id = request_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM queue WHERE position = (
                     SELECT position FROM queue ORDER BY position ASC LIMIT 1
                 ) AND request_id = ?1",
                params![request_id],
            )
        })
        .await?;
        Ok(())
    }

    /// Membership test across the whole queue, not just the head.
    pub async fn queue_has_request_id(&self, request_id: &str) -> Result<bool> {
        let request_id = request_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT 1 FROM queue WHERE request_id = ?1",
                params![request_id],
                |_| Ok(()),
            )
            .optional()
        })
        .await
        .map(|row| row.is_some())
    }

    pub async fn queue_is_empty(&self) -> Result<bool> {
        let count: i64 = self
            .with_conn(|conn| conn.query_row("SELECT count(*) FROM queue", [], |row| row.get(0)))
            .await?;
        Ok(count == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(id: &str) -> Request {
        Request {
            request_id: id.to_string(),
            emails: vec!["a@example.com".to_string()],
            response_url: None,
        }
    }

    #[tokio::test]
    async fn test_add_and_current() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(store.queue_is_empty().await.unwrap());

        let outcome = store.queue_add(req("r1")).await.unwrap();
        assert!(outcome.success);
        assert!(!store.queue_is_empty().await.unwrap());

        let current = store.queue_current().await.unwrap().unwrap();
        assert_eq!(current.request_id, "r1");
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let store = Store::open_in_memory().await.unwrap();
        store.queue_add(req("r1")).await.unwrap();
        store.queue_add(req("r1")).await.unwrap();

        let count: i64 = store
            .with_conn(|conn| conn.query_row("SELECT count(*) FROM queue", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_done_removes_only_matching_head() {
        let store = Store::open_in_memory().await.unwrap();
        store.queue_add(req("r1")).await.unwrap();
        store.queue_add(req("r2")).await.unwrap();

        store.queue_done("r2").await.unwrap();
        assert_eq!(store.queue_current().await.unwrap().unwrap().request_id, "r1");

        store.queue_done("r1").await.unwrap();
        assert_eq!(store.queue_current().await.unwrap().unwrap().request_id, "r2");
    }

    #[tokio::test]
    async fn test_has_request_id() {
        let store = Store::open_in_memory().await.unwrap();
        store.queue_add(req("r1")).await.unwrap();
        assert!(store.queue_has_request_id("r1").await.unwrap());
        assert!(!store.queue_has_request_id("missing").await.unwrap());
    }
}
