//! Worker-slot assignment table: one row per busy worker.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use crate::error::Result;
use crate::store::Store;
use crate::types::{Assignment, Request};

impl Store {
    /// Upsert the assignment for `worker_index`, replacing any prior one.
    pub async fn assignment_put(&self, worker_index: u32, request: &Request) -> Result<()> {
        let request_json = serde_json::to_string(request)?;
        let request_id = request.request_id.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO assignments (worker_index, request_id, request_json, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(worker_index) DO UPDATE SET
                     request_id = excluded.request_id,
                     request_json = excluded.request_json,
                     created_at = excluded.created_at",
                params![worker_index, request_id, request_json, Utc::now().to_rfc3339()],
            )
        })
        .await?;
        Ok(())
    }

    pub async fn assignment_get(&self, worker_index: u32) -> Result<Option<Assignment>> {
        let row = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT request_json, created_at FROM assignments WHERE worker_index = ?1",
                    params![worker_index],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()
            })
            .await?;

        match row {
            None => Ok(None),
            Some((request_json, created_at)) => Ok(Some(Assignment {
                worker_index,
                request: serde_json::from_str(&request_json)?,
                created_at: created_at
                    .parse()
                    .map_err(|e| crate::error::StoreError::Internal(format!("bad timestamp: {e}")))?,
            })),
        }
    }

    pub async fn assignment_clear(&self, worker_index: u32) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM assignments WHERE worker_index = ?1", params![worker_index])
        })
        .await?;
        Ok(())
    }

    /// All currently-assigned request ids, used by startup recovery to
    /// exclude in-flight requests from the orphan scan.
    pub async fn assignment_request_ids(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT request_id FROM assignments")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect()
        })
        .await
    }

    /// Every assignment row, used by startup recovery to recover the full
    /// `Request` (including its email list) a prior process's worker had
    /// in flight when it died.
    pub async fn assignment_all(&self) -> Result<Vec<Assignment>> {
        let rows = self
            .with_conn(|conn| {
                let mut stmt =
                    conn.prepare("SELECT worker_index, request_json, created_at FROM assignments")?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await?;

        rows.into_iter()
            .map(|(worker_index, request_json, created_at)| {
                Ok(Assignment {
                    worker_index,
                    request: serde_json::from_str(&request_json)?,
                    created_at: created_at
                        .parse()
                        .map_err(|e| crate::error::StoreError::Internal(format!("bad timestamp: {e}")))?,
                })
            })
            .collect()
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
    async fn test_put_get_clear() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(store.assignment_get(0).await.unwrap().is_none());

        store.assignment_put(0, &req("r1")).await.unwrap();
        let assignment = store.assignment_get(0).await.unwrap().unwrap();
        assert_eq!(assignment.request.request_id, "r1");
        assert_eq!(assignment.worker_index, 0);

        store.assignment_clear(0).await.unwrap();
        assert!(store.assignment_get(0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_upserts_single_row_per_slot() {
        let store = Store::open_in_memory().await.unwrap();
        store.assignment_put(0, &req("r1")).await.unwrap();
        store.assignment_put(0, &req("r2")).await.unwrap();

        assert_eq!(store.assignment_get(0).await.unwrap().unwrap().request.request_id, "r2");
        assert_eq!(store.assignment_request_ids().await.unwrap(), vec!["r2".to_string()]);
    }

    #[tokio::test]
    async fn test_assignment_all_returns_full_requests() {
        let store = Store::open_in_memory().await.unwrap();
        store.assignment_put(0, &req("r1")).await.unwrap();
        store.assignment_put(1, &req("r2")).await.unwrap();

        let mut all = store.assignment_all().await.unwrap();
        all.sort_by_key(|a| a.worker_index);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].request.request_id, "r1");
        assert_eq!(all[1].request.request_id, "r2");
    }
}
