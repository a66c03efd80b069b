//! Fetching media bytes over HTTP

use crate::error::{LoadError, Result};
use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// A fetched response, read fully into memory
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedMedia {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Source of media bytes for the cache
///
/// Implementations report transport failures as [`LoadError`]; a response
/// with a non-success status is still `Ok` and is judged by the cache.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia>;
}

/// `reqwest`-backed transport
///
/// Relative URLs are resolved against `base_url` when one is configured.
pub struct HttpTransport {
    client: Client,
    base_url: Option<Url>,
}

impl HttpTransport {
    /// Create a transport with a 30 second timeout
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a transport with a custom timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: None,
        }
    }

    /// Resolve relative media URLs against this base
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    fn resolve(&self, url: &str) -> Result<Url> {
        match Url::parse(url) {
            Ok(absolute) => Ok(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self.base_url.as_ref().ok_or_else(|| {
                    LoadError::Network(format!("relative URL without a base: {}", url))
                })?;
                base.join(url)
                    .map_err(|e| LoadError::Network(format!("invalid URL {}: {}", url, e)))
            }
            Err(e) => Err(LoadError::Network(format!("invalid URL {}: {}", url, e))),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia> {
        let target = self.resolve(url)?;
        debug!(url = %target, "Fetching media");

        // Let any intermediate HTTP cache answer, even with a stale copy
        let response = self
            .client
            .get(target)
            .header(CACHE_CONTROL, "max-stale")
            .send()
            .await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response
            .bytes()
            .await
            .map_err(|e| LoadError::Storage(e.to_string()))?
            .to_vec();

        debug!(status, size = body.len(), "Fetched media");

        Ok(FetchedMedia {
            status,
            content_type,
            body,
        })
    }
}
