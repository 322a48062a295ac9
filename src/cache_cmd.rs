//! `scholar cache` and `scholar sync`: offline store maintenance from the CLI.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use scholar_site_core::cache::CacheStorage;

use crate::config::Config;
use crate::db;
use crate::migrate::migrate_pool;
use crate::sqlite_cache::SqliteCacheStorage;
use crate::worker::fetcher::HttpFetcher;
use crate::worker::sync::{SqliteSyncQueue, SyncQueue};
use crate::worker::{OfflineWorker, WorkerSettings};

/// Print every cache with its entry count, plus pending sync submissions.
pub async fn run_cache_list(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    let storage = SqliteCacheStorage::new(pool.clone());
    let names = config.offline.cache_names();

    let caches = storage.cache_names().await?;
    if caches.is_empty() {
        println!("No caches.");
    } else {
        println!("{:<36} {:>8}  {}", "CACHE", "ENTRIES", "STATUS");
        for name in &caches {
            let entries = storage.keys(name).await?.len();
            let status = if names.is_current(name) {
                "current"
            } else {
                "stale"
            };
            println!("{:<36} {:>8}  {}", name, entries, status);
        }
    }

    let pending = SqliteSyncQueue::new(pool.clone()).counts().await?;
    if !pending.is_empty() {
        println!();
        println!("{:<36} {:>8}", "SYNC TAG", "PENDING");
        for (tag, count) in pending {
            println!("{:<36} {:>8}", tag, count);
        }
    }

    pool.close().await;
    Ok(())
}

/// Delete stale caches, or every cache with `all`.
pub async fn run_cache_clear(config: &Config, all: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    let storage = SqliteCacheStorage::new(pool.clone());
    let names = config.offline.cache_names();

    let existing = storage.cache_names().await?;
    let targets: Vec<&str> = if all {
        existing.iter().map(String::as_str).collect()
    } else {
        names.stale(&existing)
    };

    if targets.is_empty() {
        println!("Nothing to clear.");
    }
    for name in targets {
        if storage.delete_cache(name).await? {
            println!("deleted {}", name);
        }
    }

    pool.close().await;
    Ok(())
}

/// Replay queued submissions for `tag` against the upstream.
pub async fn run_sync(config: &Config, tag: &str) -> Result<()> {
    let offline = &config.offline;
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;

    let fetcher = HttpFetcher::new(
        &offline.upstream,
        Duration::from_secs(offline.fetch_timeout_secs),
    )?;
    let worker = OfflineWorker::new(
        Arc::new(SqliteCacheStorage::new(pool.clone())),
        Arc::new(fetcher),
        WorkerSettings::from_config(offline),
    )
    .with_sync_queue(Arc::new(SqliteSyncQueue::new(pool.clone())));

    let report = worker.replay(tag).await?;
    println!(
        "sync {}: {} delivered, {} failed",
        tag,
        report.delivered.len(),
        report.failed.len()
    );
    for failure in &report.failed {
        println!("  {}: {}", failure.url, failure.error);
    }

    pool.close().await;
    Ok(())
}
