//! The cache ledger: per-file integrity and recency metadata.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::CacheError;

const CACHE_INDEX_VERSION: u32 = 1;
pub(crate) const CACHE_INDEX_FILE: &str = "cache-index.json";

/// Hex SHA-256 digest of a file's raw bytes.
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntryMetadata {
    pub file_name: String,
    pub bytes: u64,
    pub hash: String,
    pub last_accessed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheIndexData {
    version: u32,
    entries: HashMap<String, CacheEntryMetadata>,
}

impl CacheIndexData {
    fn empty() -> Self {
        Self {
            version: CACHE_INDEX_VERSION,
            entries: HashMap::new(),
        }
    }
}

/// In-memory mapping of file name to metadata, persisted as a single JSON
/// ledger file. Mutations are in-memory only; callers batch them and call
/// [`CacheIndex::persist`].
pub struct CacheIndex {
    index_path: PathBuf,
    data: Option<CacheIndexData>,
}

impl CacheIndex {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            index_path: cache_dir.join(CACHE_INDEX_FILE),
            data: None,
        }
    }

    /// Read the ledger from disk. Idempotent: a no-op once loaded. A missing
    /// file, a version mismatch, or unparseable content all reset to empty;
    /// the store is responsible for wiping documents on a version change.
    pub fn load(&mut self) -> Result<(), CacheError> {
        if self.data.is_some() {
            return Ok(());
        }

        let raw = match std::fs::read(&self.index_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.data = Some(CacheIndexData::empty());
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<CacheIndexData>(&raw) {
            Ok(parsed) if parsed.version == CACHE_INDEX_VERSION => self.data = Some(parsed),
            _ => self.data = Some(CacheIndexData::empty()),
        }

        Ok(())
    }

    /// Serialize the full ledger to disk, overwriting. Not incremental;
    /// callers batch mutations before persisting.
    pub fn persist(&mut self) -> Result<(), CacheError> {
        if self.data.is_none() {
            self.load()?;
        }
        let json = serde_json::to_vec_pretty(self.data.as_ref().unwrap())?;
        std::fs::write(&self.index_path, json)?;
        Ok(())
    }

    pub fn get_entry(&self, file_name: &str) -> Option<&CacheEntryMetadata> {
        self.data.as_ref()?.entries.get(file_name)
    }

    pub fn set_entry(&mut self, entry: CacheEntryMetadata) {
        self.data
            .get_or_insert_with(CacheIndexData::empty)
            .entries
            .insert(entry.file_name.clone(), entry);
    }

    pub fn remove_entry(&mut self, file_name: &str) {
        if let Some(data) = self.data.as_mut() {
            data.entries.remove(file_name);
        }
    }

    pub fn clear(&mut self) {
        self.data = Some(CacheIndexData::empty());
    }

    pub fn list_entries(&self) -> Vec<CacheEntryMetadata> {
        self.data
            .as_ref()
            .map(|d| d.entries.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn total_bytes(&self) -> u64 {
        self.list_entries().iter().map(|e| e.bytes).sum()
    }

    pub fn entry_count(&self) -> usize {
        self.data.as_ref().map(|d| d.entries.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(file_name: &str, bytes: u64) -> CacheEntryMetadata {
        let now = Utc::now();
        CacheEntryMetadata {
            file_name: file_name.to_string(),
            bytes,
            hash: content_hash(file_name.as_bytes()),
            last_accessed_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_load_missing_file_initializes_empty() {
        let temp = tempdir().unwrap();
        let mut index = CacheIndex::new(temp.path());
        index.load().unwrap();
        assert_eq!(index.entry_count(), 0);
    }

    #[test]
    fn test_persist_and_reload() {
        let temp = tempdir().unwrap();
        let mut index = CacheIndex::new(temp.path());
        index.load().unwrap();
        index.set_entry(entry("a.json", 10));
        index.set_entry(entry("b.json", 32));
        index.persist().unwrap();

        let mut reloaded = CacheIndex::new(temp.path());
        reloaded.load().unwrap();
        assert_eq!(reloaded.entry_count(), 2);
        assert_eq!(reloaded.total_bytes(), 42);
        assert_eq!(reloaded.get_entry("a.json").unwrap().bytes, 10);
    }

    #[test]
    fn test_version_mismatch_resets_to_empty() {
        let temp = tempdir().unwrap();
        std::fs::write(
            temp.path().join("cache-index.json"),
            r#"{"version": 99, "entries": {"a.json": {}}}"#,
        )
        .unwrap();

        let mut index = CacheIndex::new(temp.path());
        index.load().unwrap();
        assert_eq!(index.entry_count(), 0);
    }

    #[test]
    fn test_garbage_ledger_resets_to_empty() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("cache-index.json"), "not json").unwrap();

        let mut index = CacheIndex::new(temp.path());
        index.load().unwrap();
        assert_eq!(index.entry_count(), 0);
    }

    #[test]
    fn test_remove_entry() {
        let temp = tempdir().unwrap();
        let mut index = CacheIndex::new(temp.path());
        index.set_entry(entry("a.json", 10));
        index.remove_entry("a.json");
        assert!(index.get_entry("a.json").is_none());
    }

    #[test]
    fn test_content_hash_is_stable_hex_sha256() {
        assert_eq!(
            content_hash(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
