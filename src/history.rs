//! Action-history ledger — the sole authority on "already done".
//!
//! One append-only table keyed by (item permalink, action name). Rows are
//! written immediately after a successful side effect and never mutated or
//! deleted; unbounded growth is acceptable at this scale. With no database
//! path configured the ledger lives in memory, so a restart resets the
//! dedup window.

use std::sync::Arc;

use chrono::Utc;
use libsql::params;
use tracing::{debug, info};

use crate::error::HistoryError;

/// Durable (or in-memory) ledger of performed actions.
///
/// `libsql::Connection` is `Send + Sync` and safe for concurrent use from
/// all three stream loops. `add` uses an insert-if-absent write so
/// interleaved loops can never corrupt the table.
pub struct History {
    #[allow(dead_code)]
    db: Arc<libsql::Database>,
    conn: libsql::Connection,
}

impl History {
    /// Open (or create) the ledger at `path`, or in memory when `None`.
    pub async fn open(path: Option<&str>) -> Result<Self, HistoryError> {
        let location = path.unwrap_or(":memory:");
        let db = libsql::Builder::new_local(location)
            .build()
            .await
            .map_err(|e| HistoryError::Open(format!("{location}: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| HistoryError::Open(e.to_string()))?;

        let history = Self {
            db: Arc::new(db),
            conn,
        };
        history.init_schema().await?;
        info!(location, "History ledger opened");
        Ok(history)
    }

    async fn init_schema(&self) -> Result<(), HistoryError> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS history (
                    url    TEXT NOT NULL,
                    action TEXT NOT NULL,
                    time   TEXT NOT NULL,
                    PRIMARY KEY (url, action)
                )",
                (),
            )
            .await?;
        Ok(())
    }

    /// Whether (url, action) has already been performed.
    pub async fn check(&self, url: &str, action: &str) -> Result<bool, HistoryError> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM history WHERE url = ?1 AND action = ?2",
                params![url, action],
            )
            .await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(count > 0)
    }

    /// Record (url, action). Idempotent: re-adding an existing pair is a
    /// no-op, which closes the check-then-act race within a poll cycle.
    pub async fn add(&self, url: &str, action: &str) -> Result<(), HistoryError> {
        debug!(url, action, "Recording action in history");
        self.conn
            .execute(
                "INSERT OR IGNORE INTO history (url, action, time) VALUES (?1, ?2, ?3)",
                params![url, action, Utc::now().to_rfc3339()],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn check_then_add_then_check() {
        let history = History::open(None).await.unwrap();
        assert!(!history.check("/r/t/comments/abc/", "remove").await.unwrap());
        history.add("/r/t/comments/abc/", "remove").await.unwrap();
        assert!(history.check("/r/t/comments/abc/", "remove").await.unwrap());
    }

    #[tokio::test]
    async fn actions_are_keyed_independently() {
        let history = History::open(None).await.unwrap();
        history.add("/r/t/comments/abc/", "comment").await.unwrap();
        assert!(!history.check("/r/t/comments/abc/", "remove").await.unwrap());
        assert!(!history.check("/r/t/comments/xyz/", "comment").await.unwrap());
    }

    #[tokio::test]
    async fn double_add_is_a_noop() {
        let history = History::open(None).await.unwrap();
        history.add("/r/t/comments/abc/", "ban").await.unwrap();
        history.add("/r/t/comments/abc/", "ban").await.unwrap();
        assert!(history.check("/r/t/comments/abc/", "ban").await.unwrap());
    }

    #[tokio::test]
    async fn survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        let path_str = path.to_str().unwrap();

        {
            let history = History::open(Some(path_str)).await.unwrap();
            history.add("/r/t/comments/abc/", "remove").await.unwrap();
        }

        let history = History::open(Some(path_str)).await.unwrap();
        assert!(history.check("/r/t/comments/abc/", "remove").await.unwrap());
    }
}
