use std::env;
use std::path::PathBuf;

/// Application configuration loaded from environment variables.
/// Everything has a workable default (the primary search backend needs no
/// credentials), so a bare `castnet run` works out of the box.
#[derive(Debug, Clone)]
pub struct Config {
    /// Target profile name, see `profile::target_profile`.
    pub profile: String,

    /// Search-backend region hint, e.g. "jp-jp".
    pub search_region: String,

    // Worker pools
    pub harvest_workers: usize,
    pub verify_workers: usize,

    /// Result entries requested per harvest query.
    pub max_results_per_query: usize,

    // Inter-item jitter window, milliseconds. Informal rate-limit respect,
    // not a correctness contract.
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,

    // Optional overrides of the profile's follower window.
    pub min_followers: Option<u64>,
    pub max_followers: Option<u64>,

    // Browserless rendering service (bio-check variant only).
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if a numeric var fails to parse.
    pub fn from_env() -> Self {
        Self {
            profile: env::var("CASTNET_PROFILE").unwrap_or_else(|_| "jp-finance".to_string()),
            search_region: env::var("SEARCH_REGION").unwrap_or_else(|_| "jp-jp".to_string()),
            harvest_workers: parsed_env("HARVEST_WORKERS", 4),
            verify_workers: parsed_env("VERIFY_WORKERS", 2),
            max_results_per_query: parsed_env("MAX_RESULTS_PER_QUERY", 50),
            delay_min_ms: parsed_env("DELAY_MIN_MS", 2000),
            delay_max_ms: parsed_env("DELAY_MAX_MS", 4000),
            min_followers: optional_parsed_env("MIN_FOLLOWERS"),
            max_followers: optional_parsed_env("MAX_FOLLOWERS"),
            browserless_url: env::var("BROWSERLESS_URL").ok(),
            browserless_token: env::var("BROWSERLESS_TOKEN").ok(),
        }
    }
}

/// Root data directory, controlled by `DATA_DIR` env var (default: `"data"`).
/// Mount a persistent volume there for resumable long runs.
pub fn data_dir() -> PathBuf {
    PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()))
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number, got {v:?}")),
        Err(_) => default,
    }
}

fn optional_parsed_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().map(|v| {
        v.parse()
            .unwrap_or_else(|_| panic!("{key} must be a number, got {v:?}"))
    })
}
