use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables on an open pool. Idempotent.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // Named caches: one row per (cache, url)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache_entries (
            cache_name TEXT NOT NULL,
            url TEXT NOT NULL,
            status INTEGER NOT NULL,
            headers_json TEXT NOT NULL DEFAULT '[]',
            body BLOB NOT NULL,
            stored_at INTEGER NOT NULL,
            PRIMARY KEY (cache_name, url)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Deferred submissions awaiting background sync
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_queue (
            id TEXT PRIMARY KEY,
            tag TEXT NOT NULL,
            method TEXT NOT NULL,
            path TEXT NOT NULL,
            content_type TEXT,
            body BLOB NOT NULL,
            queued_at INTEGER NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sync_queue_tag ON sync_queue(tag, queued_at)")
        .execute(pool)
        .await?;

    Ok(())
}
