//! Embedded, WAL-journaled store backing the verification pipeline.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::error::{Result, StoreError};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS queue (
    position     INTEGER PRIMARY KEY AUTOINCREMENT,
    request_id   TEXT NOT NULL UNIQUE,
    emails       TEXT NOT NULL,
    response_url TEXT,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS assignments (
    worker_index INTEGER PRIMARY KEY,
    request_id   TEXT NOT NULL,
    request_json TEXT NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS archive (
    request_id     TEXT PRIMARY KEY,
    emails         TEXT NOT NULL,
    response_url   TEXT,
    partial_result TEXT NOT NULL,
    created_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS results (
    request_id        TEXT PRIMARY KEY,
    status             TEXT NOT NULL,
    verifying          INTEGER NOT NULL,
    greylist_found     INTEGER NOT NULL,
    blacklist_found    INTEGER NOT NULL,
    results            TEXT,
    total_emails       INTEGER NOT NULL,
    completed_emails   INTEGER NOT NULL,
    webhook_sent       INTEGER NOT NULL,
    webhook_attempts   INTEGER NOT NULL,
    response_url       TEXT,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS anti_greylist (
    request_id     TEXT PRIMARY KEY,
    emails         TEXT NOT NULL,
    response_url   TEXT,
    attempts       INTEGER NOT NULL,
    next_retry_at  TEXT NOT NULL,
    created_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS catch_all_cache (
    domain      TEXT PRIMARY KEY,
    catch_all   INTEGER NOT NULL,
    confidence  INTEGER NOT NULL,
    test_count  INTEGER NOT NULL,
    expires_at  TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
";

/// Durable state for the verification pipeline: queue, assignments,
/// archive, results, anti-greylist and catch-all cache tables, all in one
/// WAL-journaled SQLite database.
///
/// All access goes through `spawn_blocking`, since `rusqlite` is
/// synchronous; the connection itself is guarded by a plain `Mutex`
/// because only one blocking task touches it at a time.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (creating if needed) the database at `path` and apply schema.
    pub async fn open(path: impl AsRef<Path> + Send + 'static) -> Result<Self> {
        let conn = tokio::task::spawn_blocking(move || -> rusqlite::Result<Connection> {
            let conn = Connection::open(path)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database, used by tests.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio::task::spawn_blocking(|| -> rusqlite::Result<Connection> {
            let conn = Connection::open_in_memory()?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking closure against the connection off the async runtime.
    pub(crate) async fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            f(&conn).map_err(StoreError::from)
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory_creates_schema() {
        let store = Store::open_in_memory().await.unwrap();
        let tables: i64 = store
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT count(*) FROM sqlite_master WHERE type='table'",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();
        assert_eq!(tables, 6);
    }

    #[tokio::test]
    async fn test_open_file_backed_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mailcheck.db");

        let store = Store::open(path.clone()).await.unwrap();
        store.queue_add(crate::types::Request {
            request_id: "r1".into(),
            emails: vec!["a@example.com".into()],
            response_url: None,
        })
        .await
        .unwrap();
        drop(store);

        let reopened = Store::open(path).await.unwrap();
        assert!(reopened.queue_has_request_id("r1").await.unwrap());
    }
}
