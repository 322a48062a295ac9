//! Content API and page server.
//!
//! Serves the site's content as JSON, the fuzzy search endpoint, and a
//! minimal HTML rendering of each page. This is the origin the offline
//! proxy sits in front of.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/personal` | Name, title, bio, links |
//! | `GET`  | `/api/research` | Projects (`status`, `keyword`, `sort=year\|title`) |
//! | `GET`  | `/api/research/{id}` | One project |
//! | `GET`  | `/api/publications` | Publications (`type`, `year`, `keyword`, `sort=year\|citations\|title`, `limit`) |
//! | `GET`  | `/api/publications/{id}` | One publication |
//! | `GET`  | `/api/search` | Fuzzy search (`q`, `limit`) |
//! | `POST` | `/api/contact` | Contact form submission |
//! | `POST` | `/api/analytics` | Analytics beacon |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/`, `/research`, `/publications`, `/teaching`, `/cv`, `/offline` | HTML pages |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "unknown status: paused" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404).

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use scholar_site_core::content::{
    PersonalInfo, ProjectQuery, ProjectSort, ProjectStatus, Publication, PublicationKind,
    PublicationQuery, PublicationSort, ResearchProject,
};
use scholar_site_core::index::RecordType;
use scholar_site_core::search::{search, SearchOptions, SearchResult};

use crate::config::Config;
use crate::content::{load_site, SiteData};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub site: SiteData,
    pub search: Arc<SearchOptions>,
}

impl AppState {
    pub fn new(site: SiteData, config: &Config) -> Self {
        Self {
            site,
            search: Arc::new(config.search.options()),
        }
    }
}

/// Starts the content server on `[server].bind`.
///
/// Loads the content file once; every request reads the same snapshot.
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let site = load_site(config)?;
    info!(
        projects = site.store.projects().len(),
        publications = site.store.publications().len(),
        records = site.corpus.len(),
        "content loaded"
    );
    let state = AppState::new(site, config);
    let bind_addr = config.server.bind.clone();

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("Content server listening on http://{}", bind_addr);
    axum::serve(listener, router(state)).await?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/personal", get(handle_personal))
        .route("/api/research", get(handle_research))
        .route("/api/research/{id}", get(handle_project))
        .route("/api/publications", get(handle_publications))
        .route("/api/publications/{id}", get(handle_publication))
        .route("/api/search", get(handle_search))
        .route("/api/contact", post(handle_contact))
        .route("/api/analytics", post(handle_analytics))
        .route("/", get(page_home))
        .route("/research", get(page_research))
        .route("/publications", get(page_publications))
        .route("/teaching", get(page_teaching))
        .route("/cv", get(page_cv))
        .route("/offline", get(page_offline))
        .layer(cors)
        .with_state(state)
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

pub struct AppError {
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

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Content API ============

async fn handle_personal(State(state): State<AppState>) -> Json<PersonalInfo> {
    Json(state.site.store.personal().clone())
}

#[derive(Deserialize, Default)]
struct ResearchParams {
    status: Option<String>,
    keyword: Option<String>,
    sort: Option<String>,
}

#[derive(Serialize)]
struct ResearchResponse {
    projects: Vec<ResearchProject>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

async fn handle_research(
    State(state): State<AppState>,
    Query(params): Query<ResearchParams>,
) -> Result<Json<ResearchResponse>, AppError> {
    let status = match non_empty(params.status) {
        Some(s) => Some(
            ProjectStatus::parse(&s).ok_or_else(|| bad_request(format!("unknown status: {}", s)))?,
        ),
        None => None,
    };
    let sort = match non_empty(params.sort).as_deref() {
        None | Some("year") => ProjectSort::Year,
        Some("title") => ProjectSort::Title,
        Some(other) => return Err(bad_request(format!("unknown sort: {}", other))),
    };
    let query = ProjectQuery {
        status,
        keyword: non_empty(params.keyword),
        sort,
    };

    let projects = state
        .site
        .store
        .list_projects(&query)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(ResearchResponse { projects }))
}

async fn handle_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ResearchProject>, AppError> {
    state
        .site
        .store
        .project(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found(format!("no research project with id: {}", id)))
}

#[derive(Deserialize, Default)]
struct PublicationParams {
    #[serde(rename = "type")]
    kind: Option<String>,
    year: Option<String>,
    keyword: Option<String>,
    sort: Option<String>,
    limit: Option<String>,
}

#[derive(Serialize)]
struct PublicationsResponse {
    publications: Vec<Publication>,
    total_citations: u64,
}

async fn handle_publications(
    State(state): State<AppState>,
    Query(params): Query<PublicationParams>,
) -> Result<Json<PublicationsResponse>, AppError> {
    let kind = match non_empty(params.kind) {
        Some(s) => Some(
            PublicationKind::parse(&s)
                .ok_or_else(|| bad_request(format!("unknown publication type: {}", s)))?,
        ),
        None => None,
    };
    let year = match non_empty(params.year) {
        Some(s) => Some(
            s.parse::<i32>()
                .map_err(|_| bad_request(format!("invalid year: {}", s)))?,
        ),
        None => None,
    };
    let limit = match non_empty(params.limit) {
        Some(s) => Some(
            s.parse::<usize>()
                .map_err(|_| bad_request(format!("invalid limit: {}", s)))?,
        ),
        None => None,
    };
    let sort = match non_empty(params.sort).as_deref() {
        None | Some("year") => PublicationSort::Year,
        Some("citations") => PublicationSort::Citations,
        Some("title") => PublicationSort::Title,
        Some(other) => return Err(bad_request(format!("unknown sort: {}", other))),
    };
    let query = PublicationQuery {
        kind,
        year,
        keyword: non_empty(params.keyword),
        sort,
        limit,
    };

    let publications = state
        .site
        .store
        .list_publications(&query)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(PublicationsResponse {
        publications,
        total_citations: state.site.store.total_citations(),
    }))
}

async fn handle_publication(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Publication>, AppError> {
    state
        .site
        .store
        .publication(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found(format!("no publication with id: {}", id)))
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    limit: Option<String>,
}

#[derive(Serialize)]
struct SearchResponse {
    query: String,
    results: Vec<SearchResult>,
}

/// Handler for `GET /api/search`. Short or empty queries give an empty list.
async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let mut opts = (*state.search).clone();
    if let Some(s) = non_empty(params.limit) {
        let limit = s
            .parse::<usize>()
            .map_err(|_| bad_request(format!("invalid limit: {}", s)))?;
        if limit == 0 {
            return Err(bad_request("limit must be >= 1"));
        }
        opts.limit = Some(limit);
    }
    let results = search(&state.site.corpus, &params.q, &opts);
    Ok(Json(SearchResponse {
        query: params.q,
        results,
    }))
}

#[derive(Deserialize)]
struct ContactForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    message: String,
}

async fn handle_contact(
    payload: Result<Json<ContactForm>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(form) = payload.map_err(|e| bad_request(e.body_text()))?;
    if form.name.trim().is_empty() || form.message.trim().is_empty() {
        return Err(bad_request("name and message must not be empty"));
    }
    if !form.email.contains('@') {
        return Err(bad_request("invalid email address"));
    }
    info!(from = %form.email, chars = form.message.len(), "contact form received");
    Ok(Json(serde_json::json!({ "received": true })))
}

async fn handle_analytics(
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Json(event) = payload.map_err(|e| bad_request(e.body_text()))?;
    info!(event = %event, "analytics event");
    Ok(StatusCode::NO_CONTENT)
}

// ============ Pages ============

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(state: &AppState, title: &str, body: &str) -> Response {
    let name = escape(&state.site.store.personal().name);
    let html = format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{title} | {name}</title></head>\n<body>\n<nav><a href=\"/\">Home</a> <a href=\"/research\">Research</a> <a href=\"/publications\">Publications</a> <a href=\"/teaching\">Teaching</a> <a href=\"/cv\">CV</a></nav>\n<main>\n{body}</main>\n</body>\n</html>\n",
        title = escape(title),
        name = name,
        body = body,
    );
    ([(header::CACHE_CONTROL, "no-cache")], Html(html)).into_response()
}

fn render_project(p: &ResearchProject) -> String {
    let years = match (p.start_year, p.end_year) {
        (Some(s), Some(e)) => format!(" ({}-{})", s, e),
        (Some(s), None) => format!(" ({}-)", s),
        _ => String::new(),
    };
    format!(
        "<article id=\"{}\"><h3>{}{}</h3><p>{}</p></article>\n",
        escape(&p.id),
        escape(&p.title),
        years,
        escape(&p.description)
    )
}

fn render_publication(p: &Publication) -> String {
    format!(
        "<li id=\"{}\">{} ({}). <em>{}</em>. {}.</li>\n",
        escape(&p.id),
        escape(&p.authors.join(", ")),
        p.year,
        escape(&p.title),
        escape(&p.venue)
    )
}

async fn page_home(State(state): State<AppState>) -> Response {
    let personal = state.site.store.personal();
    let mut body = format!(
        "<h1>{}</h1>\n<p>{}, {}</p>\n<p>{}</p>\n",
        escape(&personal.name),
        escape(&personal.title),
        escape(&personal.institution),
        escape(&personal.bio)
    );
    if !personal.research_interests.is_empty() {
        body.push_str("<h2>Research interests</h2>\n<ul>\n");
        for interest in &personal.research_interests {
            body.push_str(&format!("<li>{}</li>\n", escape(interest)));
        }
        body.push_str("</ul>\n");
    }
    page(&state, "Home", &body)
}

async fn page_research(State(state): State<AppState>) -> Response {
    let mut body = String::from("<h1>Research</h1>\n");
    for status in ProjectStatus::ALL {
        let projects: Vec<_> = state.site.store.projects_with_status(status).collect();
        if projects.is_empty() {
            continue;
        }
        body.push_str(&format!("<h2>{}</h2>\n", status.as_str()));
        for p in projects {
            body.push_str(&render_project(p));
        }
    }
    page(&state, "Research", &body)
}

async fn page_publications(State(state): State<AppState>) -> Response {
    let mut body = String::from("<h1>Publications</h1>\n");
    for kind in PublicationKind::ALL {
        let query = PublicationQuery {
            kind: Some(kind),
            ..Default::default()
        };
        let pubs = state.site.store.list_publications(&query);
        if pubs.is_empty() {
            continue;
        }
        body.push_str(&format!("<h2>{}</h2>\n<ul>\n", kind.as_str()));
        for p in pubs {
            body.push_str(&render_publication(p));
        }
        body.push_str("</ul>\n");
    }
    page(&state, "Publications", &body)
}

async fn page_teaching(State(state): State<AppState>) -> Response {
    let mut body = String::from("<h1>Teaching</h1>\n");
    for course in state
        .site
        .corpus
        .iter()
        .filter(|r| r.record_type == RecordType::Course)
    {
        body.push_str(&format!(
            "<article id=\"{}\"><h3>{}</h3><p>{}</p></article>\n",
            escape(&course.id),
            escape(&course.title),
            escape(&course.content)
        ));
    }
    page(&state, "Teaching", &body)
}

async fn page_cv(State(state): State<AppState>) -> Response {
    let store = &state.site.store;
    let personal = store.personal();
    let mut body = format!(
        "<h1>Curriculum Vitae</h1>\n<p>{}, {}, {}</p>\n<p>{}</p>\n",
        escape(&personal.name),
        escape(&personal.title),
        escape(&personal.department),
        escape(&personal.email)
    );
    body.push_str(&format!(
        "<h2>Publications</h2>\n<p>{} publications, {} citations</p>\n<ul>\n",
        store.publications().len(),
        store.total_citations()
    ));
    for p in store.list_publications(&PublicationQuery::default()) {
        body.push_str(&render_publication(p));
    }
    body.push_str("</ul>\n<h2>Research</h2>\n");
    for p in store.list_projects(&ProjectQuery::default()) {
        body.push_str(&render_project(p));
    }
    page(&state, "CV", &body)
}

async fn page_offline(State(state): State<AppState>) -> Response {
    page(
        &state,
        "Offline",
        "<h1>You are offline</h1>\n<p>Pages you have visited are still available. Everything else will load once your connection is back.</p>\n",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape("<a href=\"x\">Tom & Jerry's</a>"),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/a&gt;"
        );
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some("  ".into())), None);
        assert_eq!(non_empty(Some("x".into())).as_deref(), Some("x"));
        assert_eq!(non_empty(None), None);
    }
}
