//! Offline cache policy: cache naming, request classification, lifecycle
//! states, worker messages, and the [`CacheStorage`] abstraction.
//!
//! This module decides *what* should happen to a request. Performing the
//! network and storage I/O is the application's job; see `scholar_site::worker`.
//!
//! # Versioning
//!
//! Two named caches exist per deploy: `{prefix}-static-{version}` (seeded at
//! install) and `{prefix}-runtime-{version}` (filled as requests are seen).
//! Bumping `version` at deploy time makes every older cache stale, and
//! activation garbage-collects anything that is not one of the two current
//! names.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============ Stored responses ============

/// A response as held in cache storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Unix seconds when the entry was written. Informational only.
    pub stored_at: i64,
}

impl CachedResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
            stored_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Same status and body; timestamps and header order are ignored.
    pub fn same_content(&self, other: &CachedResponse) -> bool {
        self.status == other.status && self.body == other.body
    }
}

/// Async key-value store of named caches, keyed by request URL.
///
/// Mirrors the browser Cache Storage API closely enough for the worker
/// strategies. Writes to one key are last-write-wins. There are no
/// cross-key transactions except [`put_all`](CacheStorage::put_all).
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Names of every cache that currently holds at least one entry.
    async fn cache_names(&self) -> Result<Vec<String>>;

    async fn get(&self, cache: &str, url: &str) -> Result<Option<CachedResponse>>;

    /// Look `url` up in each of `caches`, in order.
    async fn match_any(&self, url: &str, caches: &[&str]) -> Result<Option<CachedResponse>> {
        for name in caches {
            if let Some(hit) = self.get(name, url).await? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    async fn put(&self, cache: &str, url: &str, response: &CachedResponse) -> Result<()>;

    /// Store every entry or none of them.
    async fn put_all(&self, cache: &str, entries: &[(String, CachedResponse)]) -> Result<()>;

    async fn keys(&self, cache: &str) -> Result<Vec<String>>;

    /// Remove a whole cache. Returns whether it existed.
    async fn delete_cache(&self, cache: &str) -> Result<bool>;
}

// ============ Naming ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheNames {
    pub static_cache: String,
    pub runtime_cache: String,
}

impl CacheNames {
    pub fn new(prefix: &str, version: &str) -> Self {
        Self {
            static_cache: format!("{}-static-{}", prefix, version),
            runtime_cache: format!("{}-runtime-{}", prefix, version),
        }
    }

    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_cache || name == self.runtime_cache
    }

    /// Names from `existing` that activation must delete.
    pub fn stale<'a>(&self, existing: &'a [String]) -> Vec<&'a str> {
        existing
            .iter()
            .map(String::as_str)
            .filter(|n| !self.is_current(n))
            .collect()
    }

    /// Lookup order for reads: runtime entries are fresher than install-time ones.
    pub fn lookup_order(&self) -> [&str; 2] {
        [&self.runtime_cache, &self.static_cache]
    }
}

// ============ Classification ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CacheFirst => "cache-first",
            Self::NetworkFirst => "network-first",
            Self::StaleWhileRevalidate => "stale-while-revalidate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    AcademicContent,
    StaticAsset,
    Dynamic,
    Other,
}

impl RequestClass {
    pub fn strategy(&self) -> Strategy {
        match self {
            Self::AcademicContent | Self::Other => Strategy::StaleWhileRevalidate,
            Self::StaticAsset => Strategy::CacheFirst,
            Self::Dynamic => Strategy::NetworkFirst,
        }
    }
}

pub const DEFAULT_ACADEMIC_PREFIXES: &[&str] = &["/research", "/publications", "/teaching", "/cv"];
pub const DEFAULT_NETWORK_FIRST_PREFIXES: &[&str] = &["/api/", "/_next/"];
pub const DEFAULT_STATIC_EXTENSIONS: &[&str] = &[
    "js", "css", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "woff", "woff2", "ttf", "otf",
];

/// URL-shape rules that pick a strategy per request.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    pub academic_prefixes: Vec<String>,
    pub network_first_prefixes: Vec<String>,
    pub static_extensions: Vec<String>,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self {
            academic_prefixes: DEFAULT_ACADEMIC_PREFIXES.iter().map(|s| s.to_string()).collect(),
            network_first_prefixes: DEFAULT_NETWORK_FIRST_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            static_extensions: DEFAULT_STATIC_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn has_prefix_segment(path: &str, prefix: &str) -> bool {
    if prefix.ends_with('/') {
        return path.starts_with(prefix);
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('#'),
        None => false,
    }
}

impl RoutePolicy {
    /// Classify a request path (query string already stripped).
    ///
    /// Rules are tried in order: academic prefixes, static extensions, then
    /// API/framework prefixes. So `/publications/paper.pdf` stays
    /// stale-while-revalidate and `/_next/static/app.js` is cache-first.
    pub fn classify(&self, path: &str) -> RequestClass {
        if self
            .academic_prefixes
            .iter()
            .any(|p| has_prefix_segment(path, p))
        {
            return RequestClass::AcademicContent;
        }
        let last_segment = path.rsplit('/').next().unwrap_or("");
        if let Some((_, ext)) = last_segment.rsplit_once('.') {
            let ext = ext.to_ascii_lowercase();
            if self.static_extensions.iter().any(|e| *e == ext) {
                return RequestClass::StaticAsset;
            }
        }
        if self
            .network_first_prefixes
            .iter()
            .any(|p| has_prefix_segment(path, p))
        {
            return RequestClass::Dynamic;
        }
        RequestClass::Other
    }

    pub fn strategy_for(&self, path: &str) -> Strategy {
        self.classify(path).strategy()
    }
}

// ============ Lifecycle & messages ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed; the worker never controls clients.
    Redundant,
}

impl WorkerState {
    pub fn controls_clients(&self) -> bool {
        matches!(self, Self::Activated)
    }
}

/// Client → worker messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    SkipWaiting,
    CacheAcademicContent { urls: Vec<String> },
    PrefetchResearchData,
    Sync { tag: String },
}

/// Worker → client notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerEvent {
    CacheUpdated { url: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_names_and_stale() {
        let names = CacheNames::new("mitchell", "v2");
        assert_eq!(names.static_cache, "mitchell-static-v2");
        assert_eq!(names.runtime_cache, "mitchell-runtime-v2");

        let existing = vec![
            "mitchell-static-v1".to_string(),
            "mitchell-static-v2".to_string(),
            "mitchell-runtime-v1".to_string(),
            "mitchell-runtime-v2".to_string(),
            "unrelated".to_string(),
        ];
        let stale = names.stale(&existing);
        assert_eq!(
            stale,
            vec!["mitchell-static-v1", "mitchell-runtime-v1", "unrelated"]
        );
        for s in stale {
            assert!(!names.is_current(s));
        }
    }

    #[test]
    fn test_classify() {
        let policy = RoutePolicy::default();
        assert_eq!(policy.classify("/research"), RequestClass::AcademicContent);
        assert_eq!(policy.classify("/research/sleep"), RequestClass::AcademicContent);
        assert_eq!(policy.classify("/publications/paper.pdf"), RequestClass::AcademicContent);
        assert_eq!(policy.classify("/researchers"), RequestClass::Other);
        assert_eq!(policy.classify("/styles/site.CSS"), RequestClass::StaticAsset);
        assert_eq!(policy.classify("/fonts/inter.woff2"), RequestClass::StaticAsset);
        assert_eq!(policy.classify("/api/publications"), RequestClass::Dynamic);
        assert_eq!(policy.classify("/_next/static/chunk.js"), RequestClass::StaticAsset);
        assert_eq!(policy.classify("/_next/data/build/index.json"), RequestClass::Dynamic);
        assert_eq!(policy.classify("/"), RequestClass::Other);
        assert_eq!(policy.classify("/contact"), RequestClass::Other);
        assert_eq!(policy.classify("/v1.2/readme"), RequestClass::Other);
    }

    #[test]
    fn test_strategy_mapping() {
        let policy = RoutePolicy::default();
        assert_eq!(policy.strategy_for("/cv"), Strategy::StaleWhileRevalidate);
        assert_eq!(policy.strategy_for("/logo.png"), Strategy::CacheFirst);
        assert_eq!(policy.strategy_for("/api/research"), Strategy::NetworkFirst);
        assert_eq!(policy.strategy_for("/contact"), Strategy::StaleWhileRevalidate);
    }

    #[test]
    fn test_message_wire_format() {
        let msg: WorkerMessage = serde_json::from_str(r#"{"type":"SKIP_WAITING"}"#).unwrap();
        assert_eq!(msg, WorkerMessage::SkipWaiting);

        let msg: WorkerMessage =
            serde_json::from_str(r#"{"type":"CACHE_ACADEMIC_CONTENT","urls":["/cv"]}"#).unwrap();
        assert_eq!(
            msg,
            WorkerMessage::CacheAcademicContent {
                urls: vec!["/cv".to_string()]
            }
        );

        let msg: WorkerMessage =
            serde_json::from_str(r#"{"type":"PREFETCH_RESEARCH_DATA"}"#).unwrap();
        assert_eq!(msg, WorkerMessage::PrefetchResearchData);

        let event = serde_json::to_value(WorkerEvent::CacheUpdated { url: "/cv".into() }).unwrap();
        assert_eq!(event["type"], "CACHE_UPDATED");
        assert_eq!(event["url"], "/cv");
    }

    #[test]
    fn test_cached_response_helpers() {
        let a = CachedResponse::new(
            200,
            vec![("Content-Type".into(), "text/html".into())],
            b"hi".to_vec(),
        );
        assert!(a.is_success());
        assert_eq!(a.header("content-type"), Some("text/html"));
        let mut b = a.clone();
        b.stored_at += 10;
        assert!(a.same_content(&b));
        b.body = b"bye".to_vec();
        assert!(!a.same_content(&b));
    }
}
