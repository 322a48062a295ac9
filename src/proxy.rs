//! Offline proxy: an HTTP front for [`OfflineWorker`].
//!
//! Every request that is not a control endpoint goes through
//! [`OfflineWorker::handle_fetch`]. The worker answers from its caches or
//! from the upstream content server. The response carries an
//! `x-worker-source` header naming where it came from (`cache`, `network`,
//! `offline-page`, ...).
//!
//! # Control endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/__worker/message` | Post a worker message (`SKIP_WAITING`, `SYNC`, ...) |
//! | `GET`  | `/__worker/status` | Lifecycle state, cache names and sizes, pending sync |

use axum::{
    body::{Body, Bytes},
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};

use scholar_site_core::cache::{
    CacheStorage, CachedResponse, WorkerEvent, WorkerMessage, WorkerState,
};

use crate::config::Config;
use crate::db;
use crate::migrate::migrate_pool;
use crate::sqlite_cache::SqliteCacheStorage;
use crate::worker::fetcher::{is_hop_by_hop, Fetcher, HttpFetcher};
use crate::worker::sync::SqliteSyncQueue;
use crate::worker::{FetchRequest, MessageReport, OfflineWorker, ResponseSource, WorkerSettings};

pub const SOURCE_HEADER: &str = "x-worker-source";

/// Starts the offline proxy on `[offline].bind`.
///
/// Installs the worker against the upstream before accepting requests.
/// With `wait`, the installed worker stays inactive until a `SKIP_WAITING`
/// message arrives. A failed install is logged and the proxy keeps
/// serving in passthrough mode.
pub async fn run_proxy(config: &Config, wait: bool) -> anyhow::Result<()> {
    let offline = &config.offline;
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;

    let storage = Arc::new(SqliteCacheStorage::new(pool.clone()));
    let fetcher = Arc::new(HttpFetcher::new(
        &offline.upstream,
        Duration::from_secs(offline.fetch_timeout_secs),
    )?);
    let worker = OfflineWorker::new(storage, fetcher, WorkerSettings::from_config(offline))
        .with_sync_queue(Arc::new(SqliteSyncQueue::new(pool)));
    let worker = Arc::new(worker);

    if let Err(e) = worker.start(wait).await {
        error!(error = %e, upstream = %offline.upstream, "worker install failed; passing requests through");
    }

    tokio::spawn(log_events(worker.subscribe()));

    let listener = tokio::net::TcpListener::bind(&offline.bind).await?;
    println!(
        "Offline proxy listening on http://{} (upstream {}, state {:?})",
        offline.bind,
        offline.upstream,
        worker.state()
    );
    axum::serve(listener, router(worker)).await?;

    Ok(())
}

/// Log worker events until the worker is dropped. Returns how many were logged.
async fn log_events(mut events: broadcast::Receiver<WorkerEvent>) -> usize {
    let mut logged = 0;
    loop {
        match events.recv().await {
            Ok(WorkerEvent::CacheUpdated { url }) => {
                info!(url = %url, "CACHE_UPDATED");
                logged += 1;
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "worker event log fell behind"),
            Err(RecvError::Closed) => return logged,
        }
    }
}

pub fn router<S, F>(worker: Arc<OfflineWorker<S, F>>) -> Router
where
    S: CacheStorage + 'static,
    F: Fetcher,
{
    Router::new()
        .route("/__worker/message", post(handle_message::<S, F>))
        .route("/__worker/status", get(handle_status::<S, F>))
        .fallback(handle_fetch::<S, F>)
        .with_state(worker)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn worker_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "worker_error".to_string(),
        message: message.into(),
    }
}

// ============ Fetch ============

/// Page loads announce themselves with `Sec-Fetch-Mode: navigate`; older
/// clients are recognised by a GET that accepts HTML.
fn is_navigation(method: &Method, headers: &HeaderMap) -> bool {
    if let Some(mode) = headers.get("sec-fetch-mode").and_then(|v| v.to_str().ok()) {
        return mode.eq_ignore_ascii_case("navigate");
    }
    method == Method::GET
        && headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|accept| accept.contains("text/html"))
}

fn into_response(cached: CachedResponse, source: ResponseSource) -> Response {
    let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = Response::new(Body::from(cached.body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    for (name, value) in &cached.headers {
        if is_hop_by_hop(name) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    headers.insert(SOURCE_HEADER, HeaderValue::from_static(source.as_str()));
    response
}

async fn handle_fetch<S, F>(
    State(worker): State<Arc<OfflineWorker<S, F>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: CacheStorage + 'static,
    F: Fetcher,
{
    let request = FetchRequest {
        method: method.as_str().to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers: headers
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect(),
        body: body.to_vec(),
        navigate: is_navigation(&method, &headers),
        same_origin: true,
    };

    let outcome = worker.handle_fetch(request).await;
    into_response(outcome.response, outcome.source)
}

// ============ POST /__worker/message ============

async fn handle_message<S, F>(
    State(worker): State<Arc<OfflineWorker<S, F>>>,
    payload: Result<Json<WorkerMessage>, JsonRejection>,
) -> Result<Json<MessageReport>, AppError>
where
    S: CacheStorage + 'static,
    F: Fetcher,
{
    let Json(message) = payload.map_err(|e| bad_request(e.body_text()))?;
    info!(message = ?message, "worker message");
    let report = worker.handle_message(message).await.map_err(|e| {
        warn!(error = %e, "worker message failed");
        worker_error(e.to_string())
    })?;
    Ok(Json(report))
}

// ============ GET /__worker/status ============

#[derive(Serialize)]
struct CacheSummary {
    name: String,
    entries: usize,
    current: bool,
}

#[derive(Serialize)]
struct StatusResponse {
    state: WorkerState,
    static_cache: String,
    runtime_cache: String,
    caches: Vec<CacheSummary>,
    pending_sync: Vec<PendingSync>,
}

#[derive(Serialize)]
struct PendingSync {
    tag: String,
    count: i64,
}

async fn handle_status<S, F>(
    State(worker): State<Arc<OfflineWorker<S, F>>>,
) -> Result<Json<StatusResponse>, AppError>
where
    S: CacheStorage + 'static,
    F: Fetcher,
{
    let names = &worker.settings().names;
    let storage = worker.storage();

    let mut caches = Vec::new();
    for name in storage
        .cache_names()
        .await
        .map_err(|e| worker_error(e.to_string()))?
    {
        let entries = storage
            .keys(&name)
            .await
            .map_err(|e| worker_error(e.to_string()))?
            .len();
        caches.push(CacheSummary {
            current: names.is_current(&name),
            name,
            entries,
        });
    }

    let pending_sync = worker
        .pending_sync()
        .await
        .map_err(|e| worker_error(e.to_string()))?
        .into_iter()
        .map(|(tag, count)| PendingSync { tag, count })
        .collect();

    Ok(Json(StatusResponse {
        state: worker.state(),
        static_cache: names.static_cache.clone(),
        runtime_cache: names.runtime_cache.clone(),
        caches,
        pending_sync,
    }))
}
