//! docdex: a local documentation cache and symbol search engine.
//!
//! Documents fetched from the remote documentation API are persisted in a
//! content-addressed file cache (SHA-256 integrity ledger, LRU eviction,
//! schema-version invalidation) and indexed into in-memory symbol tables
//! with token, synonym, and wildcard matching. A resumable rate-limited
//! crawler walks a technology's reference graph in the background to widen
//! coverage over time.
//!
//! Typical wiring: an [`HttpClient`] inside a [`DocsClient`], handed to a
//! [`Session`] that owns the active technology and its indexes. Everything
//! network-facing is generic over [`DocFetcher`], so the whole stack runs
//! against a scripted transport in tests.

pub mod cache;
pub mod client;
pub mod config;
pub mod crawler;
pub mod http_client;
pub mod session;
pub mod symbol_index;
pub mod types;

pub use cache::{CacheError, FileCache};
pub use client::{ClientError, DocsClient, FrameworkSearchResult, SearchOptions};
pub use config::{CacheConfig, CrawlerConfig};
pub use crawler::SymbolCrawler;
pub use http_client::{DocFetcher, FetchError, HealthStatus, HttpClient};
pub use session::{
    SearchScope, Session, SessionError, SymbolHit, SymbolSearchOptions,
};
pub use symbol_index::{IndexScope, SymbolEntry, SymbolIndex};
pub use types::{DocDocument, DocKind, Technology};
