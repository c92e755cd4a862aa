//! HTTP transport shared by the API adapters.
//!
//! Successful anonymous GET responses are cached by URL for a fixed TTL, so
//! repeated scans over the same window do not hit the upstream again.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::{debug, trace};
use url::Url;
use veneer_core::{Result, SourceError};

const MAX_CACHED_RESPONSES: u64 = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal GET transport. Implemented by [`HttpTransport`] and by test fakes.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn get(&self, url: &Url, bearer: Option<&str>) -> Result<HttpResponse>;
}

/// reqwest-backed transport with an optional TTL response cache.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    cache: Option<Cache<String, Arc<HttpResponse>>>,
}

impl HttpTransport {
    pub fn new(ttl: Option<Duration>) -> Self {
        let cache = ttl.map(|ttl| {
            Cache::builder()
                .max_capacity(MAX_CACHED_RESPONSES)
                .time_to_live(ttl)
                .name("veneer-http")
                .build()
        });
        Self {
            client: reqwest::Client::new(),
            cache,
        }
    }

    pub fn uncached() -> Self {
        Self::new(None)
    }

    async fn fetch(&self, url: &Url, bearer: Option<&str>) -> Result<HttpResponse> {
        debug!("GET {}", url);
        let mut request = self.client.get(url.clone());
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| SourceError::new("http", None, e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| SourceError::new("http", Some(status), e.to_string()))?;
        Ok(HttpResponse { status, body })
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url, bearer: Option<&str>) -> Result<HttpResponse> {
        // authenticated responses are never shared between sessions
        let cache = match (&self.cache, bearer) {
            (Some(cache), None) => cache,
            _ => return self.fetch(url, bearer).await,
        };

        let key = url.to_string();
        if let Some(hit) = cache.get(&key).await {
            trace!("Cache hit for {}", key);
            return Ok((*hit).clone());
        }
        trace!("Cache miss for {}", key);

        let response = self.fetch(url, None).await?;
        if response.is_success() {
            cache.insert(key, Arc::new(response.clone())).await;
        }
        Ok(response)
    }
}
