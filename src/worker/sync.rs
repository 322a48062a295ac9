//! Deferred submissions for background sync.
//!
//! When a sync-eligible POST (contact form, analytics beacon) cannot reach
//! the upstream, the worker parks it here under its sync tag. A later
//! `SYNC {tag}` message replays the tag's submissions oldest-first; each one
//! that reaches the upstream is removed, failures stay queued with their
//! attempt count bumped.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueuedSubmission {
    pub id: String,
    pub tag: String,
    pub method: String,
    pub path: String,
    pub content_type: Option<String>,
    #[serde(skip)]
    pub body: Vec<u8>,
    pub queued_at: i64,
    pub attempts: i64,
    pub last_error: Option<String>,
}

impl QueuedSubmission {
    pub fn new(
        tag: &str,
        method: &str,
        path: &str,
        content_type: Option<String>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tag: tag.to_string(),
            method: method.to_string(),
            path: path.to_string(),
            content_type,
            body,
            queued_at: chrono::Utc::now().timestamp(),
            attempts: 0,
            last_error: None,
        }
    }
}

#[async_trait]
pub trait SyncQueue: Send + Sync {
    async fn enqueue(&self, item: &QueuedSubmission) -> Result<()>;

    /// Pending items for `tag`, oldest first.
    async fn pending(&self, tag: &str) -> Result<Vec<QueuedSubmission>>;

    async fn remove(&self, id: &str) -> Result<()>;

    async fn record_failure(&self, id: &str, error: &str) -> Result<()>;

    /// Pending counts per tag.
    async fn counts(&self) -> Result<Vec<(String, i64)>>;
}

pub struct SqliteSyncQueue {
    pool: SqlitePool,
}

impl SqliteSyncQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncQueue for SqliteSyncQueue {
    async fn enqueue(&self, item: &QueuedSubmission) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_queue (id, tag, method, path, content_type, body, queued_at, attempts, last_error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&item.tag)
        .bind(&item.method)
        .bind(&item.path)
        .bind(&item.content_type)
        .bind(&item.body)
        .bind(item.queued_at)
        .bind(item.attempts)
        .bind(&item.last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pending(&self, tag: &str) -> Result<Vec<QueuedSubmission>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tag, method, path, content_type, body, queued_at, attempts, last_error
            FROM sync_queue
            WHERE tag = ?
            ORDER BY queued_at ASC, rowid ASC
            "#,
        )
        .bind(tag)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| QueuedSubmission {
                id: row.get("id"),
                tag: row.get("tag"),
                method: row.get("method"),
                path: row.get("path"),
                content_type: row.get("content_type"),
                body: row.get("body"),
                queued_at: row.get("queued_at"),
                attempts: row.get("attempts"),
                last_error: row.get("last_error"),
            })
            .collect())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM sync_queue WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_failure(&self, id: &str, error: &str) -> Result<()> {
        sqlx::query("UPDATE sync_queue SET attempts = attempts + 1, last_error = ? WHERE id = ?")
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn counts(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query("SELECT tag, COUNT(*) AS n FROM sync_queue GROUP BY tag ORDER BY tag")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| (r.get("tag"), r.get("n"))).collect())
    }
}

/// In-memory queue for tests and for running without a database.
#[derive(Default)]
pub struct InMemorySyncQueue {
    items: Mutex<Vec<QueuedSubmission>>,
}

impl InMemorySyncQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncQueue for InMemorySyncQueue {
    async fn enqueue(&self, item: &QueuedSubmission) -> Result<()> {
        self.items.lock().unwrap().push(item.clone());
        Ok(())
    }

    async fn pending(&self, tag: &str) -> Result<Vec<QueuedSubmission>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.tag == tag)
            .cloned()
            .collect())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.items.lock().unwrap().retain(|i| i.id != id);
        Ok(())
    }

    async fn record_failure(&self, id: &str, error: &str) -> Result<()> {
        if let Some(item) = self.items.lock().unwrap().iter_mut().find(|i| i.id == id) {
            item.attempts += 1;
            item.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn counts(&self) -> Result<Vec<(String, i64)>> {
        let items = self.items.lock().unwrap();
        let mut counts: std::collections::BTreeMap<String, i64> = Default::default();
        for i in items.iter() {
            *counts.entry(i.tag.clone()).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::migrate::migrate_pool;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sqlite_queue_lifecycle() {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("q.sqlite")).await.unwrap();
        migrate_pool(&pool).await.unwrap();
        let queue = SqliteSyncQueue::new(pool);

        let first = QueuedSubmission::new(
            "contact-form",
            "POST",
            "/api/contact",
            Some("application/json".into()),
            br#"{"name":"A"}"#.to_vec(),
        );
        let second =
            QueuedSubmission::new("contact-form", "POST", "/api/contact", None, b"{}".to_vec());
        let other = QueuedSubmission::new("analytics", "POST", "/api/analytics", None, vec![]);
        queue.enqueue(&first).await.unwrap();
        queue.enqueue(&second).await.unwrap();
        queue.enqueue(&other).await.unwrap();

        let pending = queue.pending("contact-form").await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, first.id);
        assert_eq!(pending[0].body, first.body);

        queue.record_failure(&first.id, "offline").await.unwrap();
        let pending = queue.pending("contact-form").await.unwrap();
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("offline"));

        queue.remove(&first.id).await.unwrap();
        assert_eq!(
            queue.counts().await.unwrap(),
            vec![("analytics".to_string(), 1), ("contact-form".to_string(), 1)]
        );
    }
}
