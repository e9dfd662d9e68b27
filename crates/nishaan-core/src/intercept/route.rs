//! Request classification.

use reqwest::Method;
use url::Url;

use super::request::Request;

/// Path prefixes served from the build's static output.
const STATIC_PREFIXES: &[&str] = &["/_next/static/", "/icons/"];

const STATIC_EXTENSIONS: &[&str] = &["js", "css", "woff", "woff2", "ttf", "eot"];

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "svg", "ico", "webp"];

/// How a request is handled. Rules are checked in declaration order and
/// the first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not a GET, or not http(s): straight to the network, never cached
    Passthrough,
    StaticAsset,
    Api,
    Page,
    /// Cross-origin images and favicons
    ExternalResource,
    NetworkOnly,
}

impl Route {
    pub fn strategy_name(&self) -> &'static str {
        match self {
            Route::Passthrough => "passthrough",
            Route::StaticAsset | Route::ExternalResource => "cache-first",
            Route::Api => "network-first-timeout",
            Route::Page => "network-first-pages",
            Route::NetworkOnly => "network-only",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Router {
    origin_host: Option<String>,
    api_hosts: Vec<String>,
}

impl Router {
    pub fn new(origin: &Url, api_hosts: Vec<String>) -> Self {
        Self {
            origin_host: origin.host_str().map(str::to_string),
            api_hosts,
        }
    }

    pub fn classify(&self, request: &Request) -> Route {
        let url = &request.url;

        if request.method != Method::GET || !matches!(url.scheme(), "http" | "https") {
            return Route::Passthrough;
        }
        if is_static_asset(url) {
            return Route::StaticAsset;
        }
        if self.is_api_route(url) {
            return Route::Api;
        }
        if request.accepts_html() {
            return Route::Page;
        }
        if self.is_external_resource(url) {
            return Route::ExternalResource;
        }
        Route::NetworkOnly
    }

    fn is_api_route(&self, url: &Url) -> bool {
        if url.path().starts_with("/api/") {
            return true;
        }
        let host = url.host_str().unwrap_or_default();
        self.api_hosts.iter().any(|fragment| host.contains(fragment.as_str()))
    }

    fn is_external_resource(&self, url: &Url) -> bool {
        if url.host_str() == self.origin_host.as_deref() {
            return false;
        }
        has_extension(url.path(), IMAGE_EXTENSIONS) || url.path().contains("favicon")
    }
}

fn is_static_asset(url: &Url) -> bool {
    let path = url.path();
    STATIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
        || has_extension(path, STATIC_EXTENSIONS)
}

/// Case-sensitive, like the extension checks in the page's own asset URLs.
fn has_extension(path: &str, extensions: &[&str]) -> bool {
    path.rsplit_once('.')
        .map(|(_, ext)| extensions.contains(&ext))
        .unwrap_or(false)
}
