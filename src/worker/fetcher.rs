//! Network access for the offline worker.
//!
//! [`Fetcher`] is the seam between the caching strategies and the real
//! upstream. An HTTP error status is still a successful fetch (the
//! strategies decide what to store); only transport failures are errors,
//! matching how the browser `fetch()` resolves.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use scholar_site_core::cache::CachedResponse;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("upstream unreachable: {0}")]
    Unreachable(String),

    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// A request forwarded to the upstream origin.
#[derive(Debug, Clone, Default)]
pub struct OutgoingRequest {
    pub method: String,
    /// Path plus optional query string, e.g. `/api/publications?year=2022`.
    pub path_and_query: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl OutgoingRequest {
    pub fn get(path_and_query: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            path_and_query: path_and_query.into(),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    async fn fetch(&self, req: &OutgoingRequest) -> Result<CachedResponse, FetchError>;
}

/// Fetches from a fixed upstream origin over HTTP.
pub struct HttpFetcher {
    client: reqwest::Client,
    upstream: String,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(upstream: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            upstream: upstream.trim_end_matches('/').to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, req: &OutgoingRequest) -> Result<CachedResponse, FetchError> {
        if !req.path_and_query.starts_with('/') {
            return Err(FetchError::InvalidRequest(format!(
                "expected an origin-relative path, got '{}'",
                req.path_and_query
            )));
        }
        let url = format!("{}{}", self.upstream, req.path_and_query);
        let method = reqwest::Method::from_bytes(req.method.as_bytes())
            .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;

        let mut builder = self.client.request(method, &url);
        for (name, value) in &req.headers {
            if !is_hop_by_hop(name) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if !req.body.is_empty() {
            builder = builder.body(req.body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Unreachable(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Unreachable(e.to_string())
            }
        })?;

        Ok(CachedResponse::new(status, headers, body.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_by_hop() {
        assert!(is_hop_by_hop("Transfer-Encoding"));
        assert!(is_hop_by_hop("host"));
        assert!(!is_hop_by_hop("content-type"));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_error() {
        // Port 9 (discard) on localhost is essentially never listening.
        let fetcher = HttpFetcher::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = fetcher.fetch(&OutgoingRequest::get("/")).await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::Unreachable(_) | FetchError::Timeout(_)
        ));
    }

    #[tokio::test]
    async fn test_relative_path_required() {
        let fetcher = HttpFetcher::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let err = fetcher
            .fetch(&OutgoingRequest::get("research"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidRequest(_)));
    }
}
