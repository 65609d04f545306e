//! Daemon configuration
//!
//! Everything is read from the environment once at startup and passed
//! down explicitly.

use std::env;
use std::path::PathBuf;

const DEFAULT_ORIGIN: &str = "http://localhost:8888";
const DEFAULT_CACHE_VERSION: &str = "v6";
const DEFAULT_SEED: &str = "/,/index.html";
const DEFAULT_NETWORK_FIRST: &str = "api.exchangerate-api.com";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_SOCKET_PATH: &str = "/tmp/storefront-daemon.sock";

/// Credentials for the identity/profile platform
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: String,
    pub service_role_key: String,
}

/// Text generation settings. Without a key the analysis handler answers from a template.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub api_key: Option<String>,
    pub model: String,
}

/// Offline cache policy
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Identifier of the current generation
    pub version: String,
    /// Seed Set, in install order. The first entry is the root document.
    pub seed: Vec<String>,
    /// URL substrings that select the network-first strategy
    pub network_first: Vec<String>,
    /// Origin relative URLs are resolved against
    pub origin: String,
    /// Keep generations on disk instead of in memory
    pub persist: bool,
    /// On-disk store root; the platform cache directory when unset
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_CACHE_VERSION.to_string(),
            seed: split_list(DEFAULT_SEED),
            network_first: split_list(DEFAULT_NETWORK_FIRST),
            origin: DEFAULT_ORIGIN.to_string(),
            persist: false,
            dir: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` when either credential is missing
    pub backend: Option<BackendConfig>,
    pub analysis: AnalysisConfig,
    pub cache: CacheConfig,
    pub socket_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let backend = match (get("SUPABASE_URL"), get("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(service_role_key)) => Some(BackendConfig {
                url: url.trim_end_matches('/').to_string(),
                service_role_key,
            }),
            _ => None,
        };

        let mut seed = split_list(&get("CACHE_SEED").unwrap_or_else(|| DEFAULT_SEED.to_string()));
        if seed.is_empty() {
            seed = split_list(DEFAULT_SEED);
        }

        Self {
            backend,
            analysis: AnalysisConfig {
                api_key: get("GEMINI_API_KEY"),
                model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            },
            cache: CacheConfig {
                version: get("CACHE_VERSION").unwrap_or_else(|| DEFAULT_CACHE_VERSION.to_string()),
                seed,
                network_first: split_list(
                    &get("CACHE_NETWORK_FIRST").unwrap_or_else(|| DEFAULT_NETWORK_FIRST.to_string()),
                ),
                origin: get("APP_ORIGIN").unwrap_or_else(|| DEFAULT_ORIGIN.to_string()),
                persist: get("CACHE_DIR").is_some() || get("CACHE_PERSIST").map_or(false, |v| is_truthy(&v)),
                dir: get("CACHE_DIR").map(PathBuf::from),
            },
            socket_path: get("STOREFRONT_SOCKET")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH)),
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
