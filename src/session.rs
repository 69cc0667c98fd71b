//! Per-session state: the active technology, its symbol indexes, and the
//! background crawl slot.
//!
//! Selecting a technology scopes everything that follows; changing the
//! selection discards the scoped index and crawler wholesale rather than
//! merging symbols across technologies. An already-running background crawl
//! is left to finish against the shared cache, its slot is simply dropped.

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use regex::Regex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::client::{ClientError, DocsClient, SearchOptions};
use crate::config::CrawlerConfig;
use crate::crawler::SymbolCrawler;
use crate::http_client::DocFetcher;
use crate::symbol_index::{IndexScope, SymbolEntry, SymbolIndex};
use crate::types::{DocDocument, Technology};

/// Below this many indexed symbols a zero-hit search is treated as a
/// coverage problem rather than a genuine miss.
const THIN_INDEX_THRESHOLD: usize = 50;

#[derive(Debug)]
pub enum SessionError {
    /// Scoped operations need a selected technology first.
    NoTechnology,
    Client(ClientError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NoTechnology => {
                write!(f, "no technology selected; discover and choose one first")
            }
            SessionError::Client(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::NoTechnology => None,
            SessionError::Client(e) => Some(e),
        }
    }
}

impl From<ClientError> for SessionError {
    fn from(e: ClientError) -> Self {
        SessionError::Client(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchScope {
    #[default]
    Technology,
    Global,
}

#[derive(Debug, Clone)]
pub struct SymbolSearchOptions {
    pub max_results: usize,
    pub platform: Option<String>,
    pub symbol_type: Option<String>,
    pub scope: SearchScope,
}

impl Default for SymbolSearchOptions {
    fn default() -> Self {
        Self {
            max_results: 20,
            platform: None,
            symbol_type: None,
            scope: SearchScope::Technology,
        }
    }
}

/// A search hit, whichever layer produced it (index, reference scan, or
/// direct lookup).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolHit {
    pub title: String,
    pub path: String,
    pub kind: String,
    pub description: String,
    pub platforms: Vec<String>,
}

impl From<SymbolEntry> for SymbolHit {
    fn from(entry: SymbolEntry) -> Self {
        Self {
            title: entry.title,
            path: entry.path,
            kind: entry.kind,
            description: entry.abstract_text,
            platforms: entry.platforms,
        }
    }
}

pub struct Session<F: DocFetcher> {
    client: Arc<DocsClient<F>>,
    crawler_config: CrawlerConfig,
    active_technology: Mutex<Option<Technology>>,
    local_index: Arc<Mutex<SymbolIndex>>,
    global_index: Arc<Mutex<SymbolIndex>>,
    crawler: Mutex<Arc<SymbolCrawler<F>>>,
    crawl_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<F: DocFetcher> Session<F> {
    pub fn new(client: Arc<DocsClient<F>>, crawler_config: CrawlerConfig) -> Self {
        let crawler = Arc::new(SymbolCrawler::new(Arc::clone(&client), crawler_config.clone()));
        Self {
            client,
            crawler_config,
            active_technology: Mutex::new(None),
            local_index: Arc::new(Mutex::new(SymbolIndex::new(IndexScope::Technology(
                String::new(),
            )))),
            global_index: Arc::new(Mutex::new(SymbolIndex::new(IndexScope::Global))),
            crawler: Mutex::new(crawler),
            crawl_handle: Mutex::new(None),
        }
    }

    pub fn client(&self) -> &Arc<DocsClient<F>> {
        &self.client
    }

    pub fn active_technology(&self) -> Option<Technology> {
        self.active_technology.lock().unwrap().clone()
    }

    /// Select, switch, or clear the technology. Anything but a re-selection
    /// of the same identifier resets the scoped index, the crawler, and the
    /// crawl slot.
    pub fn set_active_technology(&self, technology: Option<Technology>) {
        let mut active = self.active_technology.lock().unwrap();
        let changed = match (&*active, &technology) {
            (Some(previous), Some(next)) => previous.identifier != next.identifier,
            (None, None) => false,
            _ => true,
        };
        *active = technology;
        let scope_path = active.as_ref().map(technology_path).unwrap_or_default();
        drop(active);

        if changed {
            info!(scope = %scope_path, "technology changed, resetting session indexes");
            *self.local_index.lock().unwrap() =
                SymbolIndex::new(IndexScope::Technology(scope_path));
            *self.global_index.lock().unwrap() = SymbolIndex::new(IndexScope::Global);
            *self.crawler.lock().unwrap() = Arc::new(SymbolCrawler::new(
                Arc::clone(&self.client),
                self.crawler_config.clone(),
            ));
            self.crawl_handle.lock().unwrap().take();
        }
    }

    pub fn is_crawl_running(&self) -> bool {
        self.crawl_handle
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn local_symbol_count(&self) -> usize {
        self.local_index.lock().unwrap().symbol_count()
    }

    pub fn global_symbol_count(&self) -> usize {
        self.global_index.lock().unwrap().symbol_count()
    }

    /// Crawl the selected technology in the foreground, feeding each stored
    /// document straight into the scoped index.
    pub async fn crawl_all_symbols(&self) -> Result<usize, SessionError> {
        let technology = self.require_technology()?;
        let crawler = Arc::clone(&*self.crawler.lock().unwrap());
        let index = Arc::clone(&self.local_index);

        let total = crawler
            .download_all_symbols(&technology, move |document| {
                index.lock().unwrap().ingest_document(document, "");
            })
            .await?;
        Ok(total)
    }

    /// Layered symbol search.
    ///
    /// The in-memory index answers first. On zero hits from a thin
    /// technology index the session spawns a background crawl and falls
    /// back to scanning the framework's reference map; on zero hits for a
    /// query shaped like a type name it attempts one direct lookup in
    /// either scope and, if that fails too under technology scope, queues
    /// the path for the next crawl wave.
    pub async fn search_symbols(
        &self,
        query: &str,
        options: &SymbolSearchOptions,
    ) -> Result<Vec<SymbolHit>, SessionError> {
        let technology = self.require_technology()?;

        let mut hits: Vec<SymbolHit> = {
            let index = match options.scope {
                SearchScope::Global => &self.global_index,
                SearchScope::Technology => &self.local_index,
            };
            let mut index = index.lock().unwrap();
            index.build_from_cache(self.client.cache());
            index.refresh_from_cache(self.client.cache());
            index
                .search(query, options.max_results * 2)
                .into_iter()
                .map(SymbolHit::from)
                .collect()
        };

        if options.scope == SearchScope::Technology
            && hits.is_empty()
            && self.local_symbol_count() < THIN_INDEX_THRESHOLD
        {
            self.spawn_background_crawl(&technology);
            hits = self.framework_fallback(&technology, query, options).await;
        }

        if let Some(platform) = &options.platform {
            let wanted = normalize_platform(platform);
            hits.retain(|hit| {
                hit.platforms
                    .iter()
                    .any(|p| normalize_platform(p).contains(&wanted))
            });
        }
        if let Some(symbol_type) = &options.symbol_type {
            let wanted = symbol_type.to_lowercase();
            hits.retain(|hit| hit.kind.to_lowercase().contains(&wanted));
        }
        hits.truncate(options.max_results);

        if hits.is_empty() && looks_like_type_name(query) {
            hits = self
                .direct_lookup_fallback(&technology, query, options.scope)
                .await;
        }

        Ok(hits)
    }

    fn require_technology(&self) -> Result<Technology, SessionError> {
        self.active_technology().ok_or(SessionError::NoTechnology)
    }

    fn spawn_background_crawl(&self, technology: &Technology) {
        if self.is_crawl_running() {
            return;
        }
        let crawler = Arc::clone(&*self.crawler.lock().unwrap());
        if crawler.is_running() {
            return;
        }

        info!(technology = %technology.title, "spawning background symbol crawl");
        let index = Arc::clone(&self.local_index);
        let technology = technology.clone();
        let handle = tokio::spawn(async move {
            let result = crawler
                .download_all_symbols(&technology, move |document| {
                    index.lock().unwrap().ingest_document(document, "");
                })
                .await;
            if let Err(error) = result {
                warn!(%error, "background symbol crawl failed");
            }
        });
        *self.crawl_handle.lock().unwrap() = Some(handle);
    }

    async fn framework_fallback(
        &self,
        technology: &Technology,
        query: &str,
        options: &SymbolSearchOptions,
    ) -> Vec<SymbolHit> {
        let search_options = SearchOptions {
            max_results: options.max_results * 2,
            platform: options.platform.clone(),
            symbol_type: options.symbol_type.clone(),
        };
        match self
            .client
            .search_framework(&technology.title, query, &search_options)
            .await
        {
            Ok(results) => results
                .into_iter()
                .map(|r| SymbolHit {
                    title: r.title,
                    path: r.path,
                    kind: r.symbol_kind.unwrap_or_else(|| "symbol".to_string()),
                    description: r.description,
                    platforms: r
                        .platforms
                        .split(", ")
                        .filter(|p| !p.is_empty())
                        .map(str::to_string)
                        .collect(),
                })
                .collect(),
            Err(error) => {
                warn!(%error, "framework reference fallback failed");
                Vec::new()
            }
        }
    }

    /// One live fetch for a query that names a specific symbol. A failed
    /// technology-scoped lookup queues the path so the next crawl wave
    /// tries it first; a failed global lookup just misses.
    async fn direct_lookup_fallback(
        &self,
        technology: &Technology,
        query: &str,
        scope: SearchScope,
    ) -> Vec<SymbolHit> {
        let framework = technology
            .identifier
            .rsplit('/')
            .next()
            .unwrap_or(&technology.identifier);
        let path = format!("documentation/{}/{}", framework, query);

        match self.client.get_symbol(&path).await {
            Ok(document) => vec![hit_from_document(&document, &path)],
            Err(error) => {
                if scope == SearchScope::Technology {
                    warn!(%error, path, "direct symbol lookup failed, queueing for crawl");
                    self.crawler
                        .lock()
                        .unwrap()
                        .queue_priority_paths(std::slice::from_ref(&path));
                } else {
                    warn!(%error, path, "direct symbol lookup failed");
                }
                Vec::new()
            }
        }
    }
}

fn hit_from_document(document: &DocDocument, path: &str) -> SymbolHit {
    SymbolHit {
        title: document.title().to_string(),
        path: path.to_string(),
        kind: document.kind_label().to_string(),
        description: document.abstract_text(),
        platforms: document.platform_names(),
    }
}

/// `doc://com.apple.documentation/documentation/swiftui` -> `swiftui`.
fn technology_path(technology: &Technology) -> String {
    let identifier = technology
        .identifier
        .strip_prefix("doc://com.apple.documentation/")
        .unwrap_or(&technology.identifier);
    identifier
        .strip_prefix("documentation/")
        .unwrap_or(identifier)
        .to_string()
}

fn normalize_platform(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// `GridItem` or `Widget.Configuration`: a bare query that names one type
/// rather than describing a topic.
fn looks_like_type_name(query: &str) -> bool {
    static SIMPLE: OnceLock<Regex> = OnceLock::new();
    static DOTTED: OnceLock<Regex> = OnceLock::new();
    let simple = SIMPLE.get_or_init(|| Regex::new(r"^[A-Z][a-zA-Z\d]*$").unwrap());
    let dotted =
        DOTTED.get_or_init(|| Regex::new(r"^[A-Z][a-zA-Z\d]*\.[A-Z][a-zA-Z\d]*$").unwrap());
    simple.is_match(query) || dotted.is_match(query)
}
