//! In-memory symbol catalog built from cached documents.
//!
//! Two scopes share one implementation: a technology-scoped index that only
//! ingests entries whose path contains the active technology's identifier,
//! and a global index over everything cached. Entries are always rebuilt
//! from the file store; nothing here persists.

mod tokens;

pub use tokens::{expand_tokens, tokenize, QueryMatcher};

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::FileCache;
use crate::types::DocDocument;

/// One searchable entry: a framework document or a referenced symbol.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolEntry {
    pub id: String,
    pub title: String,
    pub path: String,
    pub kind: String,
    pub abstract_text: String,
    pub platforms: Vec<String>,
    /// Derived token set; rebuilt on ingest, never persisted.
    #[serde(skip)]
    pub tokens: HashSet<String>,
    pub source_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexScope {
    /// Only entries whose path contains this technology identifier.
    Technology(String),
    Global,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchExplanation {
    pub score: u32,
    pub tokens: Vec<String>,
}

pub struct SymbolIndex {
    scope: IndexScope,
    /// Insertion-ordered entries; `by_id` maps id to position. Ranking ties
    /// break by this order.
    symbols: Vec<SymbolEntry>,
    by_id: HashMap<String, usize>,
    processed_files: HashSet<String>,
    index_built: bool,
}

impl SymbolIndex {
    pub fn new(scope: IndexScope) -> Self {
        Self {
            scope,
            symbols: Vec::new(),
            by_id: HashMap::new(),
            processed_files: HashSet::new(),
            index_built: false,
        }
    }

    pub fn scope(&self) -> &IndexScope {
        &self.scope
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn clear(&mut self) {
        self.symbols.clear();
        self.by_id.clear();
        self.processed_files.clear();
        self.index_built = false;
    }

    /// Full build: scan every cached document once. Idempotent; a no-op if
    /// already built.
    pub fn build_from_cache(&mut self, cache: &FileCache) {
        if self.index_built {
            debug!("symbol index already built, skipping rebuild");
            return;
        }

        let files = cache.list_document_files();
        info!(files = files.len(), "building symbol index from cached files");

        let mut processed = 0usize;
        let mut skipped = 0usize;
        for file in files {
            if self.ingest_file(cache, &file) {
                processed += 1;
            } else {
                skipped += 1;
            }
        }

        self.index_built = true;
        info!(
            symbols = self.symbols.len(),
            processed, skipped, "symbol index built"
        );
    }

    /// Incremental refresh: only files not yet seen (e.g. written by a
    /// background crawl since the last build).
    pub fn refresh_from_cache(&mut self, cache: &FileCache) {
        for file in cache.list_document_files() {
            self.ingest_file(cache, &file);
        }
    }

    fn ingest_file(&mut self, cache: &FileCache, file: &str) -> bool {
        if self.processed_files.contains(file) {
            return false;
        }

        match cache.load_document_file(file) {
            Ok(Some(document)) => {
                self.ingest_document(&document, file);
                self.processed_files.insert(file.to_string());
                true
            }
            Ok(None) => false,
            Err(error) => {
                warn!(file = %file, %error, "failed to process cached file");
                false
            }
        }
    }

    /// Ingest one document: an entry for the document itself plus one per
    /// referenced symbol. Re-ingesting the same document id overwrites it;
    /// references are first-write-wins.
    pub fn ingest_document(&mut self, document: &DocDocument, source_file: &str) {
        let title = document.title().to_string();
        let path = document.url().to_string();

        if self.out_of_scope(&path) {
            return;
        }

        let abstract_text = document.abstract_text();
        let platforms = document.platform_names();
        let tokens = build_tokens(&title, &abstract_text, &path, &platforms);
        let id = if path.is_empty() { title.clone() } else { path.clone() };

        self.insert(
            SymbolEntry {
                id,
                title,
                path,
                kind: document.kind_label().to_string(),
                abstract_text,
                platforms,
                tokens,
                source_file: source_file.to_string(),
            },
            true,
        );

        for (ref_id, reference) in &document.references {
            if reference.kind.as_deref() != Some("symbol") {
                continue;
            }
            let Some(ref_title) = reference.title.as_deref() else {
                continue;
            };
            if ref_title.is_empty() {
                continue;
            }

            let ref_path = reference.url.clone().unwrap_or_default();
            if self.out_of_scope(&ref_path) {
                continue;
            }

            let ref_abstract = reference.abstract_text();
            let ref_platforms = reference.platform_names();
            let ref_tokens = build_tokens(ref_title, &ref_abstract, &ref_path, &ref_platforms);

            self.insert(
                SymbolEntry {
                    id: ref_id.clone(),
                    title: ref_title.to_string(),
                    path: ref_path,
                    kind: "symbol".to_string(),
                    abstract_text: ref_abstract,
                    platforms: ref_platforms,
                    tokens: ref_tokens,
                    source_file: source_file.to_string(),
                },
                false,
            );
        }
    }

    fn out_of_scope(&self, path: &str) -> bool {
        match &self.scope {
            IndexScope::Global => false,
            // Entries without a path cannot be attributed, keep them.
            IndexScope::Technology(identifier) => {
                !path.is_empty() && !path.to_lowercase().contains(&identifier.to_lowercase())
            }
        }
    }

    fn insert(&mut self, entry: SymbolEntry, overwrite: bool) {
        if let Some(&position) = self.by_id.get(&entry.id) {
            if overwrite {
                self.symbols[position] = entry;
            }
            return;
        }
        self.by_id.insert(entry.id.clone(), self.symbols.len());
        self.symbols.push(entry);
    }

    /// Ranked search. Wildcard queries (`*`/`?`) are match/no-match; scored
    /// queries sum per-token awards. Zero-score entries are excluded, ties
    /// keep insertion order, results truncate to `max_results`.
    pub fn search(&self, query: &str, max_results: usize) -> Vec<SymbolEntry> {
        let matcher = QueryMatcher::new(query);

        let mut results: Vec<(u32, &SymbolEntry)> = self
            .symbols
            .iter()
            .filter_map(|entry| {
                let score = matcher.score(entry);
                (score > 0).then_some((score, entry))
            })
            .collect();

        results.sort_by(|a, b| b.0.cmp(&a.0));
        results
            .into_iter()
            .take(max_results)
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// Exact lookup: id match first, then case-insensitive title or path
    /// equality.
    pub fn find_entry(&self, query: &str) -> Option<&SymbolEntry> {
        if let Some(&position) = self.by_id.get(query) {
            return Some(&self.symbols[position]);
        }
        self.symbols.iter().find(|entry| {
            entry.title.eq_ignore_ascii_case(query) || entry.path.eq_ignore_ascii_case(query)
        })
    }

    /// The scoring function plus the expanded token list, for diagnostics.
    pub fn explain_match(&self, query: &str, entry: &SymbolEntry) -> MatchExplanation {
        let matcher = QueryMatcher::new(query);
        MatchExplanation {
            score: matcher.score(entry),
            tokens: matcher.tokens(),
        }
    }
}

fn build_tokens(
    title: &str,
    abstract_text: &str,
    path: &str,
    platforms: &[String],
) -> HashSet<String> {
    let mut tokens: HashSet<String> = tokenize(title).into_iter().collect();
    tokens.extend(tokenize(abstract_text));
    tokens.extend(tokenize(path));
    for platform in platforms {
        tokens.extend(tokenize(platform));
    }
    tokens
}
