//! SQLite-backed [`CacheStorage`] implementation.
//!
//! All named caches share the `cache_entries` table; a cache "exists" while
//! it has at least one row. Headers are stored as a JSON array of pairs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use scholar_site_core::cache::{CacheStorage, CachedResponse};

pub struct SqliteCacheStorage {
    pool: SqlitePool,
}

impl SqliteCacheStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_response(row: &sqlx::sqlite::SqliteRow) -> Result<CachedResponse> {
    let headers_json: String = row.get("headers_json");
    let headers: Vec<(String, String)> =
        serde_json::from_str(&headers_json).context("corrupt cached headers")?;
    let status: i64 = row.get("status");
    Ok(CachedResponse {
        status: status as u16,
        headers,
        body: row.get("body"),
        stored_at: row.get("stored_at"),
    })
}

const UPSERT: &str = r#"
    INSERT INTO cache_entries (cache_name, url, status, headers_json, body, stored_at)
    VALUES (?, ?, ?, ?, ?, ?)
    ON CONFLICT(cache_name, url) DO UPDATE SET
        status = excluded.status,
        headers_json = excluded.headers_json,
        body = excluded.body,
        stored_at = excluded.stored_at
"#;

#[async_trait]
impl CacheStorage for SqliteCacheStorage {
    async fn cache_names(&self) -> Result<Vec<String>> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT cache_name FROM cache_entries ORDER BY cache_name")
                .fetch_all(&self.pool)
                .await?;
        Ok(names)
    }

    async fn get(&self, cache: &str, url: &str) -> Result<Option<CachedResponse>> {
        let row = sqlx::query(
            "SELECT status, headers_json, body, stored_at FROM cache_entries WHERE cache_name = ? AND url = ?",
        )
        .bind(cache)
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_response).transpose()
    }

    async fn put(&self, cache: &str, url: &str, response: &CachedResponse) -> Result<()> {
        let headers_json = serde_json::to_string(&response.headers)?;
        sqlx::query(UPSERT)
            .bind(cache)
            .bind(url)
            .bind(response.status as i64)
            .bind(&headers_json)
            .bind(&response.body)
            .bind(response.stored_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn put_all(&self, cache: &str, entries: &[(String, CachedResponse)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (url, response) in entries {
            let headers_json = serde_json::to_string(&response.headers)?;
            sqlx::query(UPSERT)
                .bind(cache)
                .bind(url)
                .bind(response.status as i64)
                .bind(&headers_json)
                .bind(&response.body)
                .bind(response.stored_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn keys(&self, cache: &str) -> Result<Vec<String>> {
        let keys: Vec<String> =
            sqlx::query_scalar("SELECT url FROM cache_entries WHERE cache_name = ? ORDER BY url")
                .bind(cache)
                .fetch_all(&self.pool)
                .await?;
        Ok(keys)
    }

    async fn delete_cache(&self, cache: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE cache_name = ?")
            .bind(cache)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::migrate::migrate_pool;
    use tempfile::TempDir;

    async fn storage(tmp: &TempDir) -> SqliteCacheStorage {
        let pool = db::connect_path(&tmp.path().join("offline.sqlite"))
            .await
            .unwrap();
        migrate_pool(&pool).await.unwrap();
        SqliteCacheStorage::new(pool)
    }

    fn resp(body: &str) -> CachedResponse {
        CachedResponse::new(
            200,
            vec![("content-type".into(), "text/html".into())],
            body.as_bytes().to_vec(),
        )
    }

    #[tokio::test]
    async fn test_roundtrip_and_overwrite() {
        let tmp = TempDir::new().unwrap();
        let store = storage(&tmp).await;

        store.put("runtime", "/cv", &resp("old")).await.unwrap();
        store.put("runtime", "/cv", &resp("new")).await.unwrap();

        let hit = store.get("runtime", "/cv").await.unwrap().unwrap();
        assert_eq!(hit.body, b"new");
        assert_eq!(hit.header("Content-Type"), Some("text/html"));
        assert_eq!(store.keys("runtime").await.unwrap(), vec!["/cv"]);
        assert!(store.get("static", "/cv").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_names_and_delete() {
        let tmp = TempDir::new().unwrap();
        let store = storage(&tmp).await;

        store
            .put_all(
                "site-static-v1",
                &[("/".into(), resp("home")), ("/offline".into(), resp("off"))],
            )
            .await
            .unwrap();
        store.put("site-runtime-v1", "/x", &resp("x")).await.unwrap();

        assert_eq!(
            store.cache_names().await.unwrap(),
            vec!["site-runtime-v1", "site-static-v1"]
        );
        assert!(store.delete_cache("site-static-v1").await.unwrap());
        assert!(!store.delete_cache("site-static-v1").await.unwrap());
        assert_eq!(store.cache_names().await.unwrap(), vec!["site-runtime-v1"]);
    }
}
