//! Request and response values seen by the worker.

use std::collections::BTreeMap;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

use super::fetch::FetchError;

pub const CONTENT_TYPE: &str = "content-type";
pub const ACCEPT: &str = "accept";

/// Body of the synthesized 503 for API routes with no network and no cache.
pub const OFFLINE_API_BODY: &str = r#"{"error":"Offline","message":"No cached data available"}"#;

/// Last-resort page for navigations with no network, no cache, and no offline page.
pub const OFFLINE_HTML_BODY: &str =
    "<html><body><h1>Offline</h1><p>You are offline and this page is not cached.</p></body></html>";

/// An outgoing request. Header names are stored lowercased.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: BTreeMap<String, String>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: BTreeMap::new(),
        }
    }

    pub fn get(url: &str) -> Result<Self, FetchError> {
        let url = Url::parse(url)
            .map_err(|e| FetchError::InvalidRequest(format!("{}: {}", url, e)))?;
        Ok(Self::new(Method::GET, url))
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// True when the Accept header asks for HTML. A missing header never does.
    pub fn accepts_html(&self) -> bool {
        self.header(ACCEPT)
            .map(|accept| accept.contains("text/html"))
            .unwrap_or(false)
    }

    /// Identity used as the cache key: method plus absolute URL without fragment.
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        format!("{} {}", self.method, url)
    }
}

/// A response, either from the network, from a cache generation, or
/// synthesized by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(skip)]
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// 2xx
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn offline_json() -> Self {
        Self::new(503, OFFLINE_API_BODY).with_header(CONTENT_TYPE, "application/json")
    }

    pub fn offline_html() -> Self {
        Self::new(503, OFFLINE_HTML_BODY).with_header(CONTENT_TYPE, "text/html")
    }
}
