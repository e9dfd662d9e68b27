//! The network seam.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use super::request::{Request, Response};

/// HTTP request timeout in seconds.
/// Strategies with their own deadline race against this, so it only bounds
/// network-only and cache-first fetches.
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Network timeout after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Fetch task aborted: {0}")]
    Aborted(String),
}

/// Performs a request against the real network.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// Fetcher backed by reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
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

        debug!(url = %request.url, status, bytes = body.len(), "Fetched");

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
