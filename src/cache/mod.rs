//! Durable, integrity-checked document cache.
//!
//! Two layers: [`CacheIndex`] is the ledger (per-file hash/size/recency
//! metadata, the single source of truth for eviction and corruption
//! detection); [`FileCache`] owns the documents themselves plus the schema
//! marker and capacity enforcement.

mod index;
mod store;

pub use index::{content_hash, CacheEntryMetadata, CacheIndex};
pub use store::FileCache;

/// Error type for cache operations. Corruption, schema mismatch, and missing
/// files are recovered internally and never show up here.
#[derive(Debug)]
pub enum CacheError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::Io(e) => write!(f, "IO error: {}", e),
            CacheError::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(err)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Json(err)
    }
}
