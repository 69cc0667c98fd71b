//! Remote documentation transport.
//!
//! Thin fetch layer: one HTTP GET per logical path plus a short-lived
//! in-memory de-duplication cache. Durable persistence lives in the file
//! store, not here.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::config::default_base_url;

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
const MEMORY_CACHE_TTL: Duration = Duration::from_secs(600);

/// The fetch seam the cache, crawler, and session are generic over.
pub trait DocFetcher: Send + Sync + 'static {
    /// Fetch and parse the JSON document for a logical path, e.g.
    /// `documentation/swiftui` or a symbol path.
    fn fetch_document(
        &self,
        path: &str,
    ) -> impl std::future::Future<Output = Result<Value, FetchError>> + Send;

    /// Drop any in-memory response de-duplication state. No-op for fetchers
    /// that keep none.
    fn clear_transport_cache(&self) {}
}

#[derive(Debug)]
pub enum FetchError {
    Request(String),
    Status(u16, String),
    Decode(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Request(message) => write!(f, "request failed: {}", message),
            FetchError::Status(status, body) => write!(f, "HTTP {}: {}", status, body),
            FetchError::Decode(message) => write!(f, "invalid response body: {}", message),
        }
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub ok: bool,
    pub latency_ms: u64,
    pub message: Option<String>,
}

/// Short-TTL response cache keyed by URL, so repeated lookups within one
/// tool call don't refetch.
struct MemoryCache {
    entries: Mutex<HashMap<String, (Instant, Value)>>,
}

impl MemoryCache {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.lock().unwrap();
        let (stored_at, value) = entries.get(key)?;
        if stored_at.elapsed() > MEMORY_CACHE_TTL {
            return None;
        }
        Some(value.clone())
    }

    fn set(&self, key: String, value: Value) {
        self.entries
            .lock()
            .unwrap()
            .insert(key, (Instant::now(), value));
    }

    fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

/// Real transport over reqwest.
pub struct HttpClient {
    base_url: String,
    http_client: reqwest::Client,
    cache: MemoryCache,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    pub fn new() -> Self {
        Self::with_base_url(default_base_url())
    }

    pub fn with_base_url(base_url: String) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url,
            http_client,
            cache: MemoryCache::new(),
        }
    }

    /// Fetch the technology catalog path and report round-trip latency.
    pub async fn check_health(&self) -> HealthStatus {
        let start = Instant::now();
        match self.fetch_document("documentation/technologies").await {
            Ok(_) => HealthStatus {
                ok: true,
                latency_ms: start.elapsed().as_millis() as u64,
                message: None,
            },
            Err(error) => HealthStatus {
                ok: false,
                latency_ms: start.elapsed().as_millis() as u64,
                message: Some(error.to_string()),
            },
        }
    }

    async fn make_request(&self, url: &str) -> Result<Value, FetchError> {
        if let Some(cached) = self.cache.get(url) {
            return Ok(cached);
        }

        let response = self
            .http_client
            .get(url)
            .header("dnt", "1")
            .header("referer", "https://developer.apple.com/documentation")
            .header(
                "User-Agent",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36",
            )
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status(status, body));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        self.cache.set(url.to_string(), value.clone());
        Ok(value)
    }
}

impl DocFetcher for HttpClient {
    async fn fetch_document(&self, path: &str) -> Result<Value, FetchError> {
        let url = format!("{}/{}.json", self.base_url, path);
        self.make_request(&url).await
    }

    fn clear_transport_cache(&self) {
        self.cache.clear();
    }
}

/// Scripted transport for tests: maps logical paths to canned responses and
/// counts fetches.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use serde_json::Value;

    use super::{DocFetcher, FetchError};

    pub(crate) struct MockFetcher {
        responses: Mutex<HashMap<String, Value>>,
        pub(crate) fetch_count: AtomicUsize,
        /// Paths that fail this many times before succeeding.
        flaky: Mutex<HashMap<String, u32>>,
        log: Mutex<Vec<String>>,
    }

    impl MockFetcher {
        pub(crate) fn new() -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
                fetch_count: AtomicUsize::new(0),
                flaky: Mutex::new(HashMap::new()),
                log: Mutex::new(Vec::new()),
            }
        }

        /// Every fetched path, in call order.
        pub(crate) fn fetch_log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        pub(crate) fn respond(&self, path: &str, value: Value) {
            self.responses
                .lock()
                .unwrap()
                .insert(path.to_string(), value);
        }

        pub(crate) fn fail_times(&self, path: &str, failures: u32) {
            self.flaky
                .lock()
                .unwrap()
                .insert(path.to_string(), failures);
        }

        pub(crate) fn fetches(&self) -> usize {
            self.fetch_count.load(Ordering::SeqCst)
        }
    }

    impl DocFetcher for MockFetcher {
        async fn fetch_document(&self, path: &str) -> Result<Value, FetchError> {
            self.fetch_count.fetch_add(1, Ordering::SeqCst);
            self.log.lock().unwrap().push(path.to_string());

            {
                let mut flaky = self.flaky.lock().unwrap();
                if let Some(remaining) = flaky.get_mut(path) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(FetchError::Status(503, "try again".to_string()));
                    }
                }
            }

            self.responses
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| FetchError::Status(404, format!("no response for {}", path)))
        }
    }
}
