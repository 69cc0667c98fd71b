//! Resumable, rate-limited recursive symbol download.
//!
//! Starting from a technology's root framework document, the crawler walks
//! topic-section and reference identifiers breadth-first, persisting its
//! frontier to `crawl-state.json` after every batch so an interrupted crawl
//! resumes instead of restarting. Depth is bounded to keep a densely linked
//! documentation graph from turning into an unbounded walk.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::{ClientError, DocsClient};
use crate::config::CrawlerConfig;
use crate::http_client::DocFetcher;
use crate::types::{DocDocument, Technology};

/// Frontier snapshot in the cache directory. Not a document; the file store
/// excludes it from scans and the ledger.
pub const CRAWL_STATE_FILE: &str = "crawl-state.json";

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrawlState {
    technology_identifier: String,
    pending: Vec<String>,
    completed: Vec<String>,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct Frontier {
    pending: VecDeque<String>,
    completed: HashSet<String>,
}

impl Frontier {
    fn is_queued_or_done(&self, identifier: &str) -> bool {
        self.completed.contains(identifier) || self.pending.iter().any(|p| p == identifier)
    }
}

/// Map the identifier forms found in documents to fetchable relative paths.
/// `documentation/...` passes through, the canonical `doc://` prefix is
/// stripped, and absolute paths lose their leading slashes.
pub fn normalize_identifier(identifier: &str) -> String {
    if identifier.starts_with("documentation/") {
        return identifier.to_string();
    }
    if let Some(rest) = identifier.strip_prefix("doc://com.apple.documentation/") {
        return rest.trim_start_matches('/').to_string();
    }
    if identifier.contains('/') {
        return identifier.trim_start_matches('/').to_string();
    }
    identifier.to_string()
}

pub struct SymbolCrawler<F: DocFetcher> {
    client: Arc<DocsClient<F>>,
    config: CrawlerConfig,
    state_path: PathBuf,
    frontier: Mutex<Frontier>,
    running: AtomicBool,
}

/// Clears the running flag on every exit path, panics included.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<F: DocFetcher> SymbolCrawler<F> {
    pub fn new(client: Arc<DocsClient<F>>, config: CrawlerConfig) -> Self {
        let state_path = client.cache().cache_dir().join(CRAWL_STATE_FILE);
        Self {
            client,
            config,
            state_path,
            frontier: Mutex::new(Frontier::default()),
            running: AtomicBool::new(false),
        }
    }

    pub fn downloaded_count(&self) -> usize {
        self.frontier.lock().unwrap().completed.len()
    }

    pub fn pending_count(&self) -> usize {
        self.frontier.lock().unwrap().pending.len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Push paths to the queue front so the next crawl wave fetches them
    /// first. Already-completed and already-queued paths are skipped.
    pub fn queue_priority_paths(&self, paths: &[String]) {
        let mut frontier = self.frontier.lock().unwrap();
        for path in paths.iter().rev() {
            let normalized = normalize_identifier(path);
            if !frontier.is_queued_or_done(&normalized) {
                frontier.pending.push_front(normalized);
            }
        }
    }

    /// Crawl every symbol reachable from the technology's root document,
    /// within the configured depth. `on_downloaded` observes each stored
    /// document (the root framework first) as it arrives.
    ///
    /// Non-reentrant: a call while a crawl is in flight returns immediately
    /// with the current count. Individual fetch failures are retried with
    /// backoff and dropped on exhaustion; only the seed fetch can fail the
    /// whole crawl.
    pub async fn download_all_symbols(
        &self,
        technology: &Technology,
        mut on_downloaded: impl FnMut(&DocDocument) + Send,
    ) -> Result<usize, ClientError> {
        if self.running.swap(true, Ordering::SeqCst) {
            info!("symbol crawl already running, skipping");
            return Ok(self.downloaded_count());
        }
        let _guard = RunningGuard(&self.running);

        info!(technology = %technology.title, "starting comprehensive symbol download");
        self.load_state(&technology.identifier);

        if self.frontier.lock().unwrap().pending.is_empty() {
            let framework = self.client.get_framework(&technology.title).await?;
            on_downloaded(&framework);

            let seeds = framework.all_identifiers();
            debug!(identifiers = seeds.len(), "seeded crawl from framework document");
            self.queue_identifiers(&seeds);
        }

        let mut depth = 0u32;
        loop {
            if self.frontier.lock().unwrap().pending.is_empty() || depth >= self.config.max_depth {
                break;
            }
            let batch = self.next_batch();
            if batch.is_empty() {
                break;
            }

            let fetches = batch.iter().map(|identifier| async move {
                tokio::time::sleep(self.config.rate_limit_delay).await;
                let document = self.fetch_with_retry(identifier).await;
                (identifier.clone(), document)
            });
            let results = join_all(fetches).await;

            let mut discovered = Vec::new();
            for (identifier, document) in results {
                let Some(document) = document else {
                    continue;
                };
                self.frontier.lock().unwrap().completed.insert(identifier);
                on_downloaded(&document);
                discovered.extend(document.all_identifiers());
            }

            if !discovered.is_empty() {
                let queued = self.queue_identifiers(&discovered);
                if queued > 0 {
                    debug!(queued, depth = depth + 1, "found new identifiers");
                    depth += 1;
                }
            }

            self.persist_state(&technology.identifier);
        }

        let remaining = self.frontier.lock().unwrap().pending.len();
        if remaining > 0 {
            warn!(depth, remaining, "pausing crawl at depth bound");
        }
        self.persist_state(&technology.identifier);

        let total = self.downloaded_count();
        info!(total, "symbol download finished");
        Ok(total)
    }

    async fn fetch_with_retry(&self, identifier: &str) -> Option<DocDocument> {
        for attempt in 1..=self.config.max_retries {
            match self.client.get_symbol(identifier).await {
                Ok(document) => return Some(document),
                Err(error) => {
                    warn!(identifier, attempt, %error, "symbol fetch failed");
                    if attempt < self.config.max_retries {
                        let backoff = self.config.rate_limit_delay * 2u32.pow(attempt - 1);
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }
        None
    }

    fn next_batch(&self) -> Vec<String> {
        let mut frontier = self.frontier.lock().unwrap();
        let mut batch = Vec::new();
        while batch.len() < self.config.max_concurrency {
            let Some(identifier) = frontier.pending.pop_front() else {
                break;
            };
            if !frontier.completed.contains(&identifier) {
                batch.push(identifier);
            }
        }
        batch
    }

    /// Normalize, dedupe, and append. Returns how many were actually queued.
    fn queue_identifiers(&self, identifiers: &[String]) -> usize {
        let mut frontier = self.frontier.lock().unwrap();
        let mut queued = 0;
        for identifier in identifiers {
            let normalized = normalize_identifier(identifier);
            if !frontier.is_queued_or_done(&normalized) {
                frontier.pending.push_back(normalized);
                queued += 1;
            }
        }
        queued
    }

    /// Merge persisted frontier state for this technology. Paths already
    /// queued (priority requests) stay at the front; state recorded for a
    /// different technology is ignored.
    fn load_state(&self, technology_identifier: &str) {
        let mut frontier = self.frontier.lock().unwrap();

        let raw = match std::fs::read(&self.state_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!(%e, "failed to load crawl state");
                return;
            }
        };

        let Ok(state) = serde_json::from_slice::<CrawlState>(&raw) else {
            warn!("crawl state file unreadable, starting fresh");
            return;
        };
        if state.technology_identifier != technology_identifier {
            return;
        }

        frontier.completed.extend(state.completed);
        for identifier in state.pending {
            if !frontier.is_queued_or_done(&identifier) {
                frontier.pending.push_back(identifier);
            }
        }
    }

    /// Best effort; a failed snapshot only costs resumability.
    fn persist_state(&self, technology_identifier: &str) {
        let state = {
            let frontier = self.frontier.lock().unwrap();
            CrawlState {
                technology_identifier: technology_identifier.to_string(),
                pending: frontier.pending.iter().cloned().collect(),
                completed: frontier.completed.iter().cloned().collect(),
                updated_at: Utc::now(),
            }
        };

        let result = serde_json::to_vec_pretty(&state)
            .map_err(std::io::Error::other)
            .and_then(|json| {
                if let Some(parent) = self.state_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&self.state_path, json)
            });
        if let Err(e) = result {
            warn!(%e, "failed to persist crawl state");
        }
    }
}
