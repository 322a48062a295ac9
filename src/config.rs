use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scholar_site_core::cache::{
    CacheNames, RoutePolicy, DEFAULT_ACADEMIC_PREFIXES, DEFAULT_NETWORK_FIRST_PREFIXES,
    DEFAULT_STATIC_EXTENSIONS,
};
use scholar_site_core::search::SearchOptions;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub content: ContentConfig,
    #[serde(default)]
    pub search: SearchConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub offline: OfflineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContentConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_min_query_chars")]
    pub min_query_chars: usize,
    #[serde(default = "default_min_match_chars")]
    pub min_match_chars: usize,
    #[serde(default = "default_title_weight")]
    pub title_weight: f64,
    #[serde(default = "default_content_weight")]
    pub content_weight: f64,
    #[serde(default = "default_highlight_radius")]
    pub highlight_radius: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_max_recent")]
    pub max_recent: usize,
    #[serde(default = "default_popular")]
    pub popular: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            threshold: default_threshold(),
            min_query_chars: default_min_query_chars(),
            min_match_chars: default_min_match_chars(),
            title_weight: default_title_weight(),
            content_weight: default_content_weight(),
            highlight_radius: default_highlight_radius(),
            limit: default_limit(),
            max_recent: default_max_recent(),
            popular: default_popular(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    300
}
fn default_threshold() -> f64 {
    0.4
}
fn default_min_query_chars() -> usize {
    2
}
fn default_min_match_chars() -> usize {
    2
}
fn default_title_weight() -> f64 {
    2.0
}
fn default_content_weight() -> f64 {
    1.0
}
fn default_highlight_radius() -> usize {
    20
}
fn default_limit() -> usize {
    10
}
fn default_max_recent() -> usize {
    5
}
fn default_popular() -> Vec<String> {
    [
        "memory consolidation",
        "sleep",
        "working memory",
        "attention",
        "cognitive neuroscience",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl SearchConfig {
    pub fn options(&self) -> SearchOptions {
        SearchOptions {
            threshold: self.threshold,
            min_query_chars: self.min_query_chars,
            min_match_chars: self.min_match_chars,
            title_weight: self.title_weight,
            content_weight: self.content_weight,
            highlight_radius: self.highlight_radius,
            limit: Some(self.limit),
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OfflineConfig {
    #[serde(default = "default_offline_bind")]
    pub bind: String,
    /// Origin the proxy forwards to, e.g. `http://127.0.0.1:7300`.
    #[serde(default = "default_upstream")]
    pub upstream: String,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,
    /// Bumped at deploy time; older caches are deleted on activation.
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,
    #[serde(default = "default_offline_page")]
    pub offline_page: String,
    #[serde(default = "default_academic_prefixes")]
    pub academic_prefixes: Vec<String>,
    #[serde(default = "default_network_first_prefixes")]
    pub network_first_prefixes: Vec<String>,
    #[serde(default = "default_static_extensions")]
    pub static_extensions: Vec<String>,
    /// Non-GET routes whose failed submissions are queued for replay.
    #[serde(default = "default_sync_routes")]
    pub sync_routes: Vec<SyncRoute>,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct SyncRoute {
    pub path: String,
    pub tag: String,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            bind: default_offline_bind(),
            upstream: default_upstream(),
            db_path: default_db_path(),
            cache_prefix: default_cache_prefix(),
            version: default_version(),
            precache: default_precache(),
            offline_page: default_offline_page(),
            academic_prefixes: default_academic_prefixes(),
            network_first_prefixes: default_network_first_prefixes(),
            static_extensions: default_static_extensions(),
            sync_routes: default_sync_routes(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

fn default_offline_bind() -> String {
    "127.0.0.1:7400".to_string()
}
fn default_upstream() -> String {
    "http://127.0.0.1:7300".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("./data/offline.sqlite")
}
fn default_cache_prefix() -> String {
    "mitchell".to_string()
}
fn default_version() -> String {
    "v1".to_string()
}
fn default_precache() -> Vec<String> {
    ["/", "/research", "/publications", "/offline"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_offline_page() -> String {
    "/offline".to_string()
}
fn default_academic_prefixes() -> Vec<String> {
    DEFAULT_ACADEMIC_PREFIXES.iter().map(|s| s.to_string()).collect()
}
fn default_network_first_prefixes() -> Vec<String> {
    DEFAULT_NETWORK_FIRST_PREFIXES
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_static_extensions() -> Vec<String> {
    DEFAULT_STATIC_EXTENSIONS.iter().map(|s| s.to_string()).collect()
}
fn default_sync_routes() -> Vec<SyncRoute> {
    vec![
        SyncRoute {
            path: "/api/contact".to_string(),
            tag: "contact-form".to_string(),
        },
        SyncRoute {
            path: "/api/analytics".to_string(),
            tag: "analytics".to_string(),
        },
    ]
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

impl OfflineConfig {
    pub fn cache_names(&self) -> CacheNames {
        CacheNames::new(&self.cache_prefix, &self.version)
    }

    pub fn route_policy(&self) -> RoutePolicy {
        RoutePolicy {
            academic_prefixes: self.academic_prefixes.clone(),
            network_first_prefixes: self.network_first_prefixes.clone(),
            static_extensions: self
                .static_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate search
    let search = &config.search;
    if !(0.0..=1.0).contains(&search.threshold) {
        anyhow::bail!("search.threshold must be in [0.0, 1.0]");
    }
    if search.min_query_chars == 0 {
        anyhow::bail!("search.min_query_chars must be >= 1");
    }
    if search.title_weight < 0.0 || search.content_weight < 0.0 {
        anyhow::bail!("search weights must be >= 0");
    }
    if search.title_weight + search.content_weight <= 0.0 {
        anyhow::bail!("at least one of search.title_weight / search.content_weight must be > 0");
    }
    if search.limit == 0 {
        anyhow::bail!("search.limit must be >= 1");
    }

    // Validate offline
    let offline = &config.offline;
    if !offline.upstream.starts_with("http://") && !offline.upstream.starts_with("https://") {
        anyhow::bail!(
            "offline.upstream must be an http(s) URL, got '{}'",
            offline.upstream
        );
    }
    if offline.version.trim().is_empty() {
        anyhow::bail!("offline.version must not be empty");
    }
    if offline.cache_prefix.trim().is_empty() {
        anyhow::bail!("offline.cache_prefix must not be empty");
    }
    for route in offline.precache.iter().chain(std::iter::once(&offline.offline_page)) {
        if !route.starts_with('/') {
            anyhow::bail!("offline routes must start with '/': '{}'", route);
        }
    }
    if !offline.precache.contains(&offline.offline_page) {
        anyhow::bail!(
            "offline.precache must include the offline page '{}'",
            offline.offline_page
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    const MINIMAL: &str = r#"
[content]
path = "./data/content.json"

[server]
bind = "127.0.0.1:7300"
"#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let cfg = parse(MINIMAL).unwrap();
        assert_eq!(cfg.search.debounce_ms, 300);
        assert_eq!(cfg.search.max_recent, 5);
        assert_eq!(cfg.offline.version, "v1");
        assert_eq!(cfg.offline.cache_names().static_cache, "mitchell-static-v1");
        let tags: Vec<(&str, &str)> = cfg
            .offline
            .sync_routes
            .iter()
            .map(|r| (r.path.as_str(), r.tag.as_str()))
            .collect();
        assert_eq!(
            tags,
            vec![("/api/contact", "contact-form"), ("/api/analytics", "analytics")]
        );
        let opts = cfg.search.options();
        assert_eq!(opts.limit, Some(10));
        assert!((opts.threshold - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let src = format!("{}\n[search]\nthreshold = 1.5\n", MINIMAL);
        let err = parse(&src).unwrap_err().to_string();
        assert!(err.contains("threshold"), "{}", err);
    }

    #[test]
    fn test_rejects_offline_page_not_precached() {
        let src = format!(
            "{}\n[offline]\nprecache = [\"/\"]\noffline_page = \"/offline\"\n",
            MINIMAL
        );
        let err = parse(&src).unwrap_err().to_string();
        assert!(err.contains("offline page"), "{}", err);
    }

    #[test]
    fn test_rejects_non_http_upstream() {
        let src = format!("{}\n[offline]\nupstream = \"ftp://example\"\n", MINIMAL);
        assert!(parse(&src).is_err());
    }

    #[test]
    fn test_extensions_normalized() {
        let src = format!("{}\n[offline]\nstatic_extensions = [\".PDF\"]\n", MINIMAL);
        let cfg = parse(&src).unwrap();
        let policy = cfg.offline.route_policy();
        assert_eq!(policy.static_extensions, vec!["pdf"]);
    }
}
