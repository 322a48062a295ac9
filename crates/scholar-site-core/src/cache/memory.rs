//! In-memory [`CacheStorage`] for tests and embedded use.
//!
//! Uses a `BTreeMap` of caches behind `std::sync::RwLock`, so cache names
//! and keys come back sorted.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use super::{CacheStorage, CachedResponse};

type Caches = BTreeMap<String, BTreeMap<String, CachedResponse>>;

#[derive(Default)]
pub struct InMemoryCacheStorage {
    caches: RwLock<Caches>,
}

impl InMemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total entries across all caches.
    pub fn len(&self) -> usize {
        self.caches.read().unwrap().values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStorage for InMemoryCacheStorage {
    async fn cache_names(&self) -> Result<Vec<String>> {
        Ok(self.caches.read().unwrap().keys().cloned().collect())
    }

    async fn get(&self, cache: &str, url: &str) -> Result<Option<CachedResponse>> {
        let caches = self.caches.read().unwrap();
        Ok(caches.get(cache).and_then(|c| c.get(url)).cloned())
    }

    async fn put(&self, cache: &str, url: &str, response: &CachedResponse) -> Result<()> {
        let mut caches = self.caches.write().unwrap();
        caches
            .entry(cache.to_string())
            .or_default()
            .insert(url.to_string(), response.clone());
        Ok(())
    }

    async fn put_all(&self, cache: &str, entries: &[(String, CachedResponse)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut caches = self.caches.write().unwrap();
        let target = caches.entry(cache.to_string()).or_default();
        for (url, response) in entries {
            target.insert(url.clone(), response.clone());
        }
        Ok(())
    }

    async fn keys(&self, cache: &str) -> Result<Vec<String>> {
        let caches = self.caches.read().unwrap();
        Ok(caches
            .get(cache)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_cache(&self, cache: &str) -> Result<bool> {
        Ok(self.caches.write().unwrap().remove(cache).is_some())
    }
}
