//! Offline cache worker.
//!
//! [`OfflineWorker`] carries out the policy from `scholar_site_core::cache`
//! against a [`CacheStorage`] and a [`Fetcher`]. It is the server-side
//! counterpart of a site service worker. It precaches the core pages on
//! install and garbage-collects old cache versions on activation. After
//! that it answers each fetch with one of three strategies.
//!
//! # Fetch dispatch
//!
//! | Request | Strategy |
//! |---------|----------|
//! | academic pages (`/research`, `/publications`, ...) | stale-while-revalidate |
//! | static assets (by extension) | cache-first |
//! | `/api/`, `/_next/` | network-first |
//! | anything else | stale-while-revalidate |
//!
//! Non-GET and cross-origin requests bypass the caches. When every option
//! is exhausted a navigation gets the precached offline page (or a minimal
//! inline page) and anything else gets a synthetic `503`.
//! [`handle_fetch`](OfflineWorker::handle_fetch) never fails.

pub mod fetcher;
pub mod sync;

use anyhow::{bail, Result};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use scholar_site_core::cache::{
    CacheNames, CacheStorage, CachedResponse, RoutePolicy, Strategy, WorkerEvent, WorkerMessage,
    WorkerState,
};

use crate::config::{OfflineConfig, SyncRoute};
use fetcher::{Fetcher, OutgoingRequest};
use sync::{QueuedSubmission, SyncQueue};

/// Data endpoints cached by `PREFETCH_RESEARCH_DATA`.
pub const PREFETCH_URLS: &[&str] = &["/api/research", "/api/publications"];

const INLINE_OFFLINE_PAGE: &str = "<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"utf-8\"><title>Offline</title></head>\n<body><h1>You are offline</h1><p>This page is not available offline. Please check your connection and try again.</p></body></html>\n";

/// Static configuration of a worker instance.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub names: CacheNames,
    pub policy: RoutePolicy,
    pub precache: Vec<String>,
    pub offline_page: String,
    pub sync_routes: Vec<SyncRoute>,
}

impl WorkerSettings {
    pub fn from_config(offline: &OfflineConfig) -> Self {
        Self {
            names: offline.cache_names(),
            policy: offline.route_policy(),
            precache: offline.precache.clone(),
            offline_page: offline.offline_page.clone(),
            sync_routes: offline.sync_routes.clone(),
        }
    }

    fn sync_tag_for(&self, path: &str) -> Option<&str> {
        self.sync_routes
            .iter()
            .find(|r| r.path == path)
            .map(|r| r.tag.as_str())
    }
}

/// An intercepted client request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// A top-level page load, as opposed to a subresource or data request.
    pub navigate: bool,
    pub same_origin: bool,
}

impl FetchRequest {
    pub fn get(path: &str) -> Self {
        let (path, query) = match path.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (path.to_string(), None),
        };
        Self {
            method: "GET".to_string(),
            path,
            query,
            headers: Vec::new(),
            body: Vec::new(),
            navigate: false,
            same_origin: true,
        }
    }

    pub fn navigate(path: &str) -> Self {
        Self {
            navigate: true,
            ..Self::get(path)
        }
    }

    /// The cache key: path plus query string.
    pub fn url(&self) -> String {
        match &self.query {
            Some(q) if !q.is_empty() => format!("{}?{}", self.path, q),
            _ => self.path.clone(),
        }
    }

    fn outgoing(&self) -> OutgoingRequest {
        OutgoingRequest {
            method: self.method.clone(),
            path_and_query: self.url(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseSource {
    Cache,
    Network,
    OfflinePage,
    InlineOffline,
    Unavailable,
    Passthrough,
    Queued,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Network => "network",
            Self::OfflinePage => "offline-page",
            Self::InlineOffline => "inline-offline",
            Self::Unavailable => "unavailable",
            Self::Passthrough => "passthrough",
            Self::Queued => "queued",
        }
    }
}

#[derive(Debug)]
pub struct FetchOutcome {
    pub response: CachedResponse,
    pub source: ResponseSource,
    pub strategy: Option<Strategy>,
    /// Background refresh started by stale-while-revalidate.
    pub revalidation: Option<JoinHandle<()>>,
}

impl FetchOutcome {
    fn new(response: CachedResponse, source: ResponseSource, strategy: Option<Strategy>) -> Self {
        Self {
            response,
            source,
            strategy,
            revalidation: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub cache: String,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivateReport {
    pub deleted: Vec<String>,
    /// Stale caches that could not be removed. Activation still completes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlFailure {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub tag: String,
    pub delivered: Vec<String>,
    pub failed: Vec<UrlFailure>,
}

/// Result of handling a client message.
#[derive(Debug, Clone, Serialize)]
pub struct MessageReport {
    pub state: WorkerState,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cached: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<UrlFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncReport>,
}

pub struct OfflineWorker<S, F> {
    storage: Arc<S>,
    fetcher: Arc<F>,
    settings: WorkerSettings,
    state: RwLock<WorkerState>,
    events: broadcast::Sender<WorkerEvent>,
    queue: Option<Arc<dyn SyncQueue>>,
}

impl<S, F> OfflineWorker<S, F>
where
    S: CacheStorage + 'static,
    F: Fetcher,
{
    pub fn new(storage: Arc<S>, fetcher: Arc<F>, settings: WorkerSettings) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            storage,
            fetcher,
            settings,
            state: RwLock::new(WorkerState::Parsed),
            events,
            queue: None,
        }
    }

    pub fn with_sync_queue(mut self, queue: Arc<dyn SyncQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: WorkerState) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        debug!(from = ?*state, to = ?next, "worker state change");
        *state = next;
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    // ============ Lifecycle ============

    /// Precache every configured route into the static cache.
    ///
    /// Responses are collected first and written in one batch, so a single
    /// failing route leaves storage untouched and the worker `Redundant`.
    pub async fn install(&self) -> Result<InstallReport> {
        self.set_state(WorkerState::Installing);
        let cache = self.settings.names.static_cache.clone();

        let mut entries = Vec::with_capacity(self.settings.precache.len());
        for url in &self.settings.precache {
            match self.fetcher.fetch(&OutgoingRequest::get(url.as_str())).await {
                Ok(resp) if resp.is_success() => entries.push((url.clone(), resp)),
                Ok(resp) => {
                    self.set_state(WorkerState::Redundant);
                    warn!(url = %url, status = resp.status, "install failed");
                    bail!("precache of {} failed with status {}", url, resp.status);
                }
                Err(e) => {
                    self.set_state(WorkerState::Redundant);
                    warn!(url = %url, error = %e, "install failed");
                    bail!("precache of {} failed: {}", url, e);
                }
            }
        }

        if let Err(e) = self.storage.put_all(&cache, &entries).await {
            self.set_state(WorkerState::Redundant);
            warn!(error = %e, "install failed writing static cache");
            return Err(e.context("failed to write static cache"));
        }

        self.set_state(WorkerState::Installed);
        info!(cache = %cache, count = entries.len(), "installed");
        Ok(InstallReport {
            cache,
            urls: entries.into_iter().map(|(url, _)| url).collect(),
        })
    }

    /// Delete every cache that is not one of the current two, then start
    /// controlling requests.
    pub async fn activate(&self) -> Result<ActivateReport> {
        match self.state() {
            WorkerState::Installed => {}
            WorkerState::Activated => {
                return Ok(ActivateReport {
                    deleted: vec![],
                    failed: vec![],
                })
            }
            other => bail!("cannot activate a worker in state {:?}", other),
        }
        self.set_state(WorkerState::Activating);

        // Cleanup is best-effort: a storage error never blocks activation.
        let existing = match self.storage.cache_names().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "could not list caches, skipping cleanup");
                Vec::new()
            }
        };
        let mut deleted = Vec::new();
        let mut failed = Vec::new();
        for name in self.settings.names.stale(&existing) {
            match self.storage.delete_cache(name).await {
                Ok(true) => {
                    info!(cache = %name, "deleted stale cache");
                    deleted.push(name.to_string());
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(cache = %name, error = %e, "failed to delete stale cache");
                    failed.push(name.to_string());
                }
            }
        }

        self.set_state(WorkerState::Activated);
        info!(deleted = deleted.len(), failed = failed.len(), "activated");
        Ok(ActivateReport { deleted, failed })
    }

    /// Install, then activate unless `wait` is set (activation then waits
    /// for a `SKIP_WAITING` message).
    pub async fn start(&self, wait: bool) -> Result<()> {
        self.install().await?;
        if !wait {
            self.activate().await?;
        }
        Ok(())
    }

    // ============ Fetch ============

    pub async fn handle_fetch(&self, req: FetchRequest) -> FetchOutcome {
        if !self.state().controls_clients() {
            return self.passthrough(&req).await;
        }
        if !req.same_origin {
            return self.passthrough(&req).await;
        }
        if !req.method.eq_ignore_ascii_case("GET") {
            if let Some(tag) = self.settings.sync_tag_for(&req.path) {
                if let Some(queue) = &self.queue {
                    return self.send_or_queue(&req, tag, queue.as_ref()).await;
                }
            }
            return self.passthrough(&req).await;
        }

        let strategy = self.settings.policy.strategy_for(&req.path);
        debug!(url = %req.url(), strategy = strategy.as_str(), "fetch");
        match strategy {
            Strategy::CacheFirst => self.cache_first(&req).await,
            Strategy::NetworkFirst => self.network_first(&req).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(&req).await,
        }
    }

    async fn passthrough(&self, req: &FetchRequest) -> FetchOutcome {
        match self.fetcher.fetch(&req.outgoing()).await {
            Ok(resp) => FetchOutcome::new(resp, ResponseSource::Passthrough, None),
            Err(e) => {
                warn!(url = %req.url(), error = %e, "passthrough failed");
                FetchOutcome::new(
                    synthetic(502, "Bad Gateway"),
                    ResponseSource::Unavailable,
                    None,
                )
            }
        }
    }

    async fn cache_first(&self, req: &FetchRequest) -> FetchOutcome {
        let url = req.url();
        let strategy = Some(Strategy::CacheFirst);
        if let Some(hit) = self.lookup(&url).await {
            return FetchOutcome::new(hit, ResponseSource::Cache, strategy);
        }
        match self.fetcher.fetch(&req.outgoing()).await {
            Ok(resp) => {
                self.store(&url, &resp).await;
                FetchOutcome::new(resp, ResponseSource::Network, strategy)
            }
            Err(e) => {
                debug!(url = %url, error = %e, "cache-first miss and network failed");
                self.fallback(req, strategy).await
            }
        }
    }

    async fn network_first(&self, req: &FetchRequest) -> FetchOutcome {
        let url = req.url();
        let strategy = Some(Strategy::NetworkFirst);
        match self.fetcher.fetch(&req.outgoing()).await {
            Ok(resp) => {
                self.store(&url, &resp).await;
                FetchOutcome::new(resp, ResponseSource::Network, strategy)
            }
            Err(e) => {
                debug!(url = %url, error = %e, "network-first falling back to cache");
                match self.lookup(&url).await {
                    Some(hit) => FetchOutcome::new(hit, ResponseSource::Cache, strategy),
                    None => self.fallback(req, strategy).await,
                }
            }
        }
    }

    async fn stale_while_revalidate(&self, req: &FetchRequest) -> FetchOutcome {
        let url = req.url();
        let strategy = Some(Strategy::StaleWhileRevalidate);

        if let Some(hit) = self.lookup(&url).await {
            let handle = self.spawn_revalidation(req.outgoing(), url, hit.clone());
            return FetchOutcome {
                response: hit,
                source: ResponseSource::Cache,
                strategy,
                revalidation: Some(handle),
            };
        }

        match self.fetcher.fetch(&req.outgoing()).await {
            Ok(resp) => {
                self.store(&url, &resp).await;
                FetchOutcome::new(resp, ResponseSource::Network, strategy)
            }
            Err(e) => {
                debug!(url = %url, error = %e, "stale-while-revalidate miss and network failed");
                self.fallback(req, strategy).await
            }
        }
    }

    fn spawn_revalidation(
        &self,
        request: OutgoingRequest,
        url: String,
        previous: CachedResponse,
    ) -> JoinHandle<()> {
        let storage = Arc::clone(&self.storage);
        let fetcher = Arc::clone(&self.fetcher);
        let cache = self.settings.names.runtime_cache.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let fresh = match fetcher.fetch(&request).await {
                Ok(resp) if resp.is_success() => resp,
                Ok(resp) => {
                    debug!(url = %url, status = resp.status, "revalidation not stored");
                    return;
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "revalidation failed");
                    return;
                }
            };
            if let Err(e) = storage.put(&cache, &url, &fresh).await {
                warn!(url = %url, error = %e, "failed to store revalidated response");
                return;
            }
            if !fresh.same_content(&previous) {
                debug!(url = %url, "cache updated");
                // No subscribers is fine.
                let _ = events.send(WorkerEvent::CacheUpdated { url });
            }
        })
    }

    async fn lookup(&self, url: &str) -> Option<CachedResponse> {
        match self
            .storage
            .match_any(url, &self.settings.names.lookup_order())
            .await
        {
            Ok(hit) => hit,
            Err(e) => {
                warn!(url = %url, error = %e, "cache read failed");
                None
            }
        }
    }

    /// Write a 2xx response to the runtime cache. Errors are logged only.
    async fn store(&self, url: &str, resp: &CachedResponse) {
        if !resp.is_success() {
            return;
        }
        if let Err(e) = self
            .storage
            .put(&self.settings.names.runtime_cache, url, resp)
            .await
        {
            warn!(url = %url, error = %e, "cache write failed");
        }
    }

    async fn fallback(&self, req: &FetchRequest, strategy: Option<Strategy>) -> FetchOutcome {
        if req.navigate {
            if let Some(page) = self.lookup(&self.settings.offline_page).await {
                return FetchOutcome::new(page, ResponseSource::OfflinePage, strategy);
            }
            let inline = CachedResponse::new(
                503,
                vec![(
                    "content-type".to_string(),
                    "text/html; charset=utf-8".to_string(),
                )],
                INLINE_OFFLINE_PAGE.as_bytes().to_vec(),
            );
            return FetchOutcome::new(inline, ResponseSource::InlineOffline, strategy);
        }
        FetchOutcome::new(
            synthetic(503, "Service Unavailable"),
            ResponseSource::Unavailable,
            strategy,
        )
    }

    async fn send_or_queue(
        &self,
        req: &FetchRequest,
        tag: &str,
        queue: &dyn SyncQueue,
    ) -> FetchOutcome {
        let err = match self.fetcher.fetch(&req.outgoing()).await {
            Ok(resp) => return FetchOutcome::new(resp, ResponseSource::Network, None),
            Err(e) => e,
        };

        let content_type = req
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| v.clone());
        let item = QueuedSubmission::new(tag, &req.method, &req.url(), content_type, req.body.clone());
        match queue.enqueue(&item).await {
            Ok(()) => {
                info!(tag = %tag, path = %req.path, error = %err, "queued for background sync");
                let body = serde_json::json!({ "queued": true, "tag": tag, "id": item.id });
                FetchOutcome::new(
                    CachedResponse::new(
                        202,
                        vec![("content-type".to_string(), "application/json".to_string())],
                        body.to_string().into_bytes(),
                    ),
                    ResponseSource::Queued,
                    None,
                )
            }
            Err(e) => {
                warn!(tag = %tag, error = %e, "failed to queue submission");
                FetchOutcome::new(
                    synthetic(503, "Service Unavailable"),
                    ResponseSource::Unavailable,
                    None,
                )
            }
        }
    }

    // ============ Messages ============

    pub async fn handle_message(&self, msg: WorkerMessage) -> Result<MessageReport> {
        let mut report = MessageReport {
            state: self.state(),
            cached: Vec::new(),
            failed: Vec::new(),
            sync: None,
        };

        match msg {
            WorkerMessage::SkipWaiting => {
                if self.state() == WorkerState::Installed {
                    self.activate().await?;
                }
            }
            WorkerMessage::CacheAcademicContent { urls } => {
                let urls: Vec<&str> = urls.iter().map(String::as_str).collect();
                self.cache_urls(&urls, &mut report).await;
            }
            WorkerMessage::PrefetchResearchData => {
                self.cache_urls(PREFETCH_URLS, &mut report).await;
            }
            WorkerMessage::Sync { tag } => {
                report.sync = Some(self.replay(&tag).await?);
            }
        }

        report.state = self.state();
        Ok(report)
    }

    /// Fetch each URL into the runtime cache, recording failures per URL.
    async fn cache_urls(&self, urls: &[&str], report: &mut MessageReport) {
        for url in urls {
            let outcome = match self.fetcher.fetch(&OutgoingRequest::get(*url)).await {
                Ok(resp) if resp.is_success() => self
                    .storage
                    .put(&self.settings.names.runtime_cache, url, &resp)
                    .await
                    .map_err(|e| e.to_string()),
                Ok(resp) => Err(format!("status {}", resp.status)),
                Err(e) => Err(e.to_string()),
            };
            match outcome {
                Ok(()) => report.cached.push(url.to_string()),
                Err(error) => {
                    warn!(url = %url, error = %error, "failed to cache");
                    report.failed.push(UrlFailure {
                        url: url.to_string(),
                        error,
                    });
                }
            }
        }
    }

    /// Pending background-sync submissions per tag.
    pub async fn pending_sync(&self) -> Result<Vec<(String, i64)>> {
        match &self.queue {
            Some(queue) => queue.counts().await,
            None => Ok(Vec::new()),
        }
    }

    /// Replay queued submissions for `tag`, oldest first.
    ///
    /// A submission counts as delivered once the upstream answers with
    /// anything but a server error; a 4xx will not improve on retry.
    pub async fn replay(&self, tag: &str) -> Result<SyncReport> {
        let Some(queue) = &self.queue else {
            bail!("background sync is not configured");
        };

        let mut report = SyncReport {
            tag: tag.to_string(),
            ..Default::default()
        };
        for item in queue.pending(tag).await? {
            let mut headers = Vec::new();
            if let Some(ct) = &item.content_type {
                headers.push(("content-type".to_string(), ct.clone()));
            }
            let request = OutgoingRequest {
                method: item.method.clone(),
                path_and_query: item.path.clone(),
                headers,
                body: item.body.clone(),
            };
            let result = match self.fetcher.fetch(&request).await {
                Ok(resp) if resp.status < 500 => Ok(()),
                Ok(resp) => Err(format!("status {}", resp.status)),
                Err(e) => Err(e.to_string()),
            };
            match result {
                Ok(()) => {
                    queue.remove(&item.id).await?;
                    report.delivered.push(item.id);
                }
                Err(error) => {
                    queue.record_failure(&item.id, &error).await?;
                    report.failed.push(UrlFailure {
                        url: item.path,
                        error,
                    });
                }
            }
        }
        info!(
            tag = %tag,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "background sync"
        );
        Ok(report)
    }
}

fn synthetic(status: u16, text: &str) -> CachedResponse {
    CachedResponse::new(
        status,
        vec![(
            "content-type".to_string(),
            "text/plain; charset=utf-8".to_string(),
        )],
        text.as_bytes().to_vec(),
    )
}
