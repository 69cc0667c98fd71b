use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Cache location and capacity budgets for the file store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub cache_dir: PathBuf,
    pub max_bytes: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            max_bytes: env_number("DOCDEX_CACHE_MAX_BYTES", 250 * 1024 * 1024),
            max_entries: env_number("DOCDEX_CACHE_MAX_ENTRIES", 5000) as usize,
        }
    }
}

impl CacheConfig {
    /// Default budgets with an explicit cache directory (tests point this at
    /// a temp dir).
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            ..Default::default()
        }
    }
}

/// Limits for the recursive symbol crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Flat delay applied before every fetch attempt; also the base unit for
    /// retry backoff.
    pub rate_limit_delay: Duration,
    pub max_retries: u32,
    pub max_concurrency: usize,
    /// Maximum traversal depth to prevent runaway downloads.
    pub max_depth: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            rate_limit_delay: Duration::from_millis(100),
            max_retries: 3,
            max_concurrency: 5,
            max_depth: 4,
        }
    }
}

pub fn default_base_url() -> String {
    std::env::var("DOCDEX_BASE_URL")
        .unwrap_or_else(|_| "https://developer.apple.com/tutorials/data".to_string())
}

fn default_cache_dir() -> PathBuf {
    let Some(dirs) = ProjectDirs::from("com", "zaguan", "docdex") else {
        return PathBuf::from(".cache");
    };
    dirs.cache_dir().to_path_buf()
}

fn env_number(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let crawler = CrawlerConfig::default();
        assert_eq!(crawler.max_retries, 3);
        assert_eq!(crawler.max_concurrency, 5);
        assert_eq!(crawler.max_depth, 4);
        assert_eq!(crawler.rate_limit_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_with_dir_keeps_budgets() {
        let config = CacheConfig::with_dir(PathBuf::from("/tmp/docdex-test"));
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/docdex-test"));
        assert_eq!(config.max_entries, CacheConfig::default().max_entries);
    }
}
