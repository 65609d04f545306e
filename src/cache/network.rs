//! Network Seam
//!
//! The cache manager never talks to reqwest directly; it goes through the
//! `Network` trait so the serving strategies can be exercised offline.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use tracing::debug;

use super::errors::NetworkError;
use super::types::{CachedResponse, FetchRequest};

/// HTTP client timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait Network: Send + Sync {
    /// Perform the request. Any HTTP status is `Ok`; only transport failures are `Err`.
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, NetworkError>;
}

/// reqwest-backed network, resolving relative URLs against the app origin
#[derive(Clone)]
pub struct HttpNetwork {
    http_client: Client,
    origin: String,
}

impl HttpNetwork {
    pub fn new(origin: &str) -> Result<Self, NetworkError> {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(NetworkError::from)?;
        Ok(Self {
            http_client,
            origin: origin.trim_end_matches('/').to_string(),
        })
    }

    /// Absolute URL for a possibly origin-relative one
    pub fn resolve(&self, url: &str) -> String {
        resolve_url(&self.origin, url)
    }
}

/// Join a relative path onto `origin`; absolute URLs pass through
pub fn resolve_url(origin: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else if url.starts_with('/') {
        format!("{}{}", origin.trim_end_matches('/'), url)
    } else {
        format!("{}/{}", origin.trim_end_matches('/'), url)
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, NetworkError> {
        let url = self.resolve(&request.url);
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| NetworkError::Request(format!("Invalid method {}: {}", request.method, e)))?;

        let mut builder = self.http_client.request(method, &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        debug!(url = %url, status = status, size = body.len(), "Network fetch complete");

        Ok(CachedResponse {
            status,
            headers,
            body,
        })
    }
}
