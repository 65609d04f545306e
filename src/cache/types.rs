//! Request and response snapshot types
//!
//! Defines the request identity used as a cache key, the intercepted
//! request, and the immutable response snapshot stored in a generation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalised request identity used as the cache key.
///
/// The method is upper-cased and any URL fragment is stripped, so
/// `get https://a/x#top` and `GET https://a/x` address the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: &str, url: &str) -> Self {
        let url = match url.find('#') {
            Some(idx) => &url[..idx],
            None => url,
        };
        Self {
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
        }
    }

    /// Key for a plain GET of `url`
    pub fn get(url: &str) -> Self {
        Self::new("GET", url)
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Why the client issued a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Loading a full page/document
    Navigate,
    #[default]
    Cors,
    NoCors,
    SameOrigin,
}

/// A request intercepted from the client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub mode: RequestMode,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl FetchRequest {
    /// A subresource GET
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: default_method(),
            url: url.into(),
            mode: RequestMode::Cors,
            headers: Vec::new(),
        }
    }

    /// A page navigation
    pub fn navigate(url: impl Into<String>) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_ascii_uppercase();
        self
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    pub fn is_read_only(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

/// Immutable snapshot of a network response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CachedResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Only an exact 200 is eligible for caching
    pub fn is_cacheable(&self) -> bool {
        self.status == 200
    }

    /// Duplicate the snapshot into two independent copies of the same bytes.
    ///
    /// One copy goes back to the caller, the other to the store.
    pub fn fork(self) -> (Self, Self) {
        let copy = Self {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
        };
        (self, copy)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
