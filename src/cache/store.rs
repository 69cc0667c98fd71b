//! Durable document store with integrity checking, schema-version
//! invalidation, and LRU capacity eviction.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::index::{content_hash, CacheEntryMetadata, CacheIndex, CACHE_INDEX_FILE};
use super::CacheError;
use crate::config::CacheConfig;
use crate::types::{DocDocument, Technology};

const CACHE_SCHEMA_VERSION: u32 = 1;
const CACHE_SCHEMA_FILE: &str = "cache-schema.json";
const TECHNOLOGIES_FILE: &str = "technologies.json";

#[derive(Serialize, Deserialize)]
struct SchemaMarker {
    version: u32,
}

/// Persists named JSON documents (framework data, symbol data, technology
/// catalog) on top of the [`CacheIndex`] ledger. Sole writer of the cache
/// directory; corruption and schema mismatches are absorbed here and
/// reported to callers as cache misses.
pub struct FileCache {
    config: CacheConfig,
    schema_path: PathBuf,
    ledger: Mutex<CacheIndex>,
}

impl FileCache {
    pub fn new(config: CacheConfig) -> Self {
        let ledger = Mutex::new(CacheIndex::new(&config.cache_dir));
        let schema_path = config.cache_dir.join(CACHE_SCHEMA_FILE);
        Self {
            config,
            schema_path,
            ledger,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.config.cache_dir
    }

    pub fn entry_count(&self) -> usize {
        self.ledger.lock().unwrap().entry_count()
    }

    pub fn total_bytes(&self) -> u64 {
        self.ledger.lock().unwrap().total_bytes()
    }

    // ------------------------------------------------------------------
    // Framework documents
    // ------------------------------------------------------------------

    pub fn load_framework(&self, framework_name: &str) -> Result<Option<DocDocument>, CacheError> {
        self.ensure_cache_dir()?;
        let file_name = framework_file_name(framework_name);
        let Some(raw) = self.read_with_integrity(&file_name)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    pub fn save_framework(
        &self,
        framework_name: &str,
        data: &DocDocument,
    ) -> Result<(), CacheError> {
        self.ensure_cache_dir()?;
        let payload = serde_json::to_vec_pretty(data)?;
        self.write_document(&framework_file_name(framework_name), &payload)
    }

    // ------------------------------------------------------------------
    // Symbol documents
    // ------------------------------------------------------------------

    pub fn load_symbol(&self, path: &str) -> Result<Option<DocDocument>, CacheError> {
        self.ensure_cache_dir()?;
        let file_name = symbol_file_name(path);
        let Some(raw) = self.read_with_integrity(&file_name)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    pub fn save_symbol(&self, path: &str, data: &DocDocument) -> Result<(), CacheError> {
        self.ensure_cache_dir()?;
        let payload = serde_json::to_vec_pretty(data)?;
        self.write_document(&symbol_file_name(path), &payload)
    }

    // ------------------------------------------------------------------
    // Technology catalog
    // ------------------------------------------------------------------

    /// Load the cached technology catalog, tolerating both upstream shapes
    /// (a wrapper with a `references` field, or the bare map). An empty or
    /// unrecognizable catalog is a miss so the caller refetches.
    pub fn load_technologies(&self) -> Result<Option<HashMap<String, Technology>>, CacheError> {
        self.ensure_cache_dir()?;
        let Some(raw) = self.read_with_integrity(TECHNOLOGIES_FILE)? else {
            return Ok(None);
        };

        let parsed: serde_json::Value = serde_json::from_slice(&raw)?;
        match normalize_technologies(parsed) {
            Some(technologies) => Ok(Some(technologies)),
            None => {
                warn!("technologies cache exists but appears invalid, will refetch");
                Ok(None)
            }
        }
    }

    pub fn save_technologies(
        &self,
        technologies: &HashMap<String, Technology>,
    ) -> Result<(), CacheError> {
        self.ensure_cache_dir()?;
        let payload = serde_json::to_vec_pretty(technologies)?;
        self.write_document(TECHNOLOGIES_FILE, &payload)
    }

    // ------------------------------------------------------------------
    // Index-scan support
    // ------------------------------------------------------------------

    /// Names of every JSON file currently in the cache directory, ledger and
    /// schema marker excluded. Flat scan; documents are never nested.
    pub fn list_document_files(&self) -> Vec<String> {
        if self.ensure_cache_dir().is_err() {
            return Vec::new();
        }
        let Ok(entries) = std::fs::read_dir(&self.config.cache_dir) else {
            return Vec::new();
        };

        let mut files: Vec<String> = entries
            .flatten()
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| {
                name.ends_with(".json")
                    && name != CACHE_SCHEMA_FILE
                    && name != CACHE_INDEX_FILE
                    && name != crate::crawler::CRAWL_STATE_FILE
            })
            .collect();
        files.sort();
        files
    }

    /// Integrity-checked read of an arbitrary cached file, parsed as a
    /// document. Corrupt files are removed, structurally invalid ones
    /// reported as `None`; neither aborts a surrounding scan.
    pub fn load_document_file(&self, file_name: &str) -> Result<Option<DocDocument>, CacheError> {
        self.ensure_cache_dir()?;
        let Some(raw) = self.read_with_integrity(file_name)? else {
            return Ok(None);
        };

        match serde_json::from_slice(&raw) {
            Ok(document) => Ok(Some(document)),
            Err(error) => {
                warn!(file_name, %error, "invalid cache data, skipping");
                Ok(None)
            }
        }
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Delete every managed file except the schema marker and reset the
    /// ledger to empty.
    pub fn clear_all(&self) -> Result<(), CacheError> {
        self.ensure_cache_dir()?;
        self.clear_cache_dir()?;

        let mut ledger = self.ledger.lock().unwrap();
        ledger.clear();
        ledger.persist()
    }

    fn clear_cache_dir(&self) -> Result<(), CacheError> {
        for entry in std::fs::read_dir(&self.config.cache_dir)?.flatten() {
            let path = entry.path();
            if path == self.schema_path || !path.is_file() {
                continue;
            }
            remove_file_if_exists(&path)?;
        }
        Ok(())
    }

    /// Run before any load/save in a session: a schema-version mismatch on
    /// disk invalidates the entire cache contents, keeping on-disk format
    /// changes safe across upgrades without a migration step.
    fn ensure_schema_version(&self) -> Result<(), CacheError> {
        match std::fs::read(&self.schema_path) {
            Ok(raw) => {
                let current = serde_json::from_slice::<SchemaMarker>(&raw)
                    .map(|marker| marker.version)
                    .unwrap_or(0);
                if current != CACHE_SCHEMA_VERSION {
                    warn!(
                        found = current,
                        expected = CACHE_SCHEMA_VERSION,
                        "cache schema version mismatch, clearing cache"
                    );
                    self.clear_cache_dir()?;
                    self.ledger.lock().unwrap().clear();
                    self.persist_schema()?;
                }
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.persist_schema(),
            Err(e) => Err(e.into()),
        }
    }

    fn persist_schema(&self) -> Result<(), CacheError> {
        let marker = SchemaMarker {
            version: CACHE_SCHEMA_VERSION,
        };
        std::fs::write(&self.schema_path, serde_json::to_vec_pretty(&marker)?)?;
        Ok(())
    }

    fn ensure_cache_dir(&self) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.config.cache_dir)?;
        self.ensure_schema_version()?;
        self.ledger.lock().unwrap().load()
    }

    // ------------------------------------------------------------------
    // Integrity-checked reads and writes
    // ------------------------------------------------------------------

    /// Read raw bytes and verify them against the ledger hash. A mismatch
    /// means corruption: the file and its ledger entry are dropped and the
    /// read reports absent. A match (or a file the ledger has never seen)
    /// bumps `last_accessed_at`.
    fn read_with_integrity(&self, file_name: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.config.cache_dir.join(file_name);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let hash = content_hash(&raw);
        let mut ledger = self.ledger.lock().unwrap();

        let existing = ledger.get_entry(file_name).cloned();
        if let Some(existing) = &existing {
            if existing.hash != hash {
                warn!(file_name, "cache hash mismatch, removing corrupt file");
                drop(ledger);
                self.remove_corrupt_file(file_name, &path)?;
                return Ok(None);
            }
        }

        let now = Utc::now();
        ledger.set_entry(CacheEntryMetadata {
            file_name: file_name.to_string(),
            bytes: raw.len() as u64,
            hash,
            last_accessed_at: now,
            updated_at: existing.map(|e| e.updated_at).unwrap_or(now),
        });
        ledger.persist()?;

        Ok(Some(raw))
    }

    fn write_document(&self, file_name: &str, payload: &[u8]) -> Result<(), CacheError> {
        let path = self.config.cache_dir.join(file_name);
        std::fs::write(&path, payload)?;

        let now = Utc::now();
        let mut ledger = self.ledger.lock().unwrap();
        ledger.set_entry(CacheEntryMetadata {
            file_name: file_name.to_string(),
            bytes: payload.len() as u64,
            hash: content_hash(payload),
            last_accessed_at: now,
            updated_at: now,
        });
        ledger.persist()?;
        drop(ledger);

        self.enforce_limits()
    }

    fn remove_corrupt_file(&self, file_name: &str, path: &Path) -> Result<(), CacheError> {
        remove_file_if_exists(path)?;
        let mut ledger = self.ledger.lock().unwrap();
        ledger.remove_entry(file_name);
        ledger.persist()
    }

    /// Strict LRU by `last_accessed_at`: evict least-recently-accessed
    /// entries until both the byte and entry budgets hold.
    fn enforce_limits(&self) -> Result<(), CacheError> {
        let mut ledger = self.ledger.lock().unwrap();

        let mut total_bytes = ledger.total_bytes();
        let mut total_entries = ledger.entry_count();
        if total_bytes <= self.config.max_bytes && total_entries <= self.config.max_entries {
            return Ok(());
        }

        let mut entries = ledger.list_entries();
        entries.sort_by_key(|entry| entry.last_accessed_at);

        let mut to_delete = Vec::new();
        for entry in entries {
            if total_bytes <= self.config.max_bytes && total_entries <= self.config.max_entries {
                break;
            }
            total_bytes -= entry.bytes;
            total_entries -= 1;
            ledger.remove_entry(&entry.file_name);
            to_delete.push(entry.file_name);
        }

        for file_name in &to_delete {
            remove_file_if_exists(&self.config.cache_dir.join(file_name))?;
        }
        warn!(evicted = to_delete.len(), "cache over budget, evicted entries");

        ledger.persist()
    }
}

fn remove_file_if_exists(path: &Path) -> Result<(), CacheError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn sanitize_framework_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn framework_file_name(framework_name: &str) -> String {
    format!("{}.json", sanitize_framework_name(framework_name))
}

/// One file per symbol, named deterministically from its normalized path.
fn symbol_file_name(path: &str) -> String {
    format!("{}.json", path.replace('/', "__"))
}

/// Accept either `{ "references": { ... } }` or a bare identifier map, and
/// reject shapes that don't look like a technology catalog.
fn normalize_technologies(parsed: serde_json::Value) -> Option<HashMap<String, Technology>> {
    let object = parsed.as_object()?;

    if let Some(references) = object.get("references") {
        if let Ok(technologies) =
            serde_json::from_value::<HashMap<String, Technology>>(references.clone())
        {
            if !technologies.is_empty() {
                return Some(technologies);
            }
        }
    }

    let direct: HashMap<String, Technology> = serde_json::from_value(parsed).ok()?;
    if !direct.is_empty() && direct.values().next().is_some_and(Technology::looks_valid) {
        return Some(direct);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config(dir: &Path) -> CacheConfig {
        CacheConfig {
            cache_dir: dir.to_path_buf(),
            max_bytes: 250 * 1024 * 1024,
            max_entries: 5000,
        }
    }

    fn doc(title: &str, kind: Option<&str>) -> DocDocument {
        serde_json::from_value(serde_json::json!({
            "metadata": {"title": title, "symbolKind": kind},
            "abstract": [{"type": "text", "text": format!("About {}", title)}],
        }))
        .unwrap()
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let temp = tempdir().unwrap();
        let cache = FileCache::new(test_config(temp.path()));

        let data = doc("SwiftUI", None);
        cache.save_framework("SwiftUI", &data).unwrap();

        let loaded = cache.load_framework("SwiftUI").unwrap().unwrap();
        assert_eq!(loaded.title(), "SwiftUI");
        assert_eq!(loaded.abstract_text(), "About SwiftUI");
    }

    #[test]
    fn test_missing_file_is_absent_not_error() {
        let temp = tempdir().unwrap();
        let cache = FileCache::new(test_config(temp.path()));
        assert!(cache.load_framework("nothere").unwrap().is_none());
        assert!(cache.load_symbol("documentation/x/y").unwrap().is_none());
    }

    #[test]
    fn test_symbol_path_maps_to_flat_file_name() {
        let temp = tempdir().unwrap();
        let cache = FileCache::new(test_config(temp.path()));

        let data = doc("GridItem", Some("struct"));
        cache.save_symbol("documentation/swiftui/griditem", &data).unwrap();

        assert!(temp
            .path()
            .join("documentation__swiftui__griditem.json")
            .exists());
        let loaded = cache
            .load_symbol("documentation/swiftui/griditem")
            .unwrap()
            .unwrap();
        assert_eq!(loaded.title(), "GridItem");
    }

    #[test]
    fn test_tampered_file_is_dropped_on_next_load() {
        let temp = tempdir().unwrap();
        let cache = FileCache::new(test_config(temp.path()));

        cache.save_framework("SwiftUI", &doc("SwiftUI", None)).unwrap();
        let path = temp.path().join("SwiftUI.json");
        std::fs::write(&path, b"{\"tampered\": true}").unwrap();

        assert!(cache.load_framework("SwiftUI").unwrap().is_none());
        assert!(!path.exists());
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn test_fresh_store_detects_tampering_during_scan_reads() {
        let temp = tempdir().unwrap();
        {
            let cache = FileCache::new(test_config(temp.path()));
            cache.save_framework("SwiftUI", &doc("SwiftUI", None)).unwrap();
        }

        // Replace the document with valid but different content. Only the
        // ledger hash can tell this apart from a legitimate write.
        let path = temp.path().join("SwiftUI.json");
        std::fs::write(
            &path,
            serde_json::to_vec_pretty(&doc("Impostor", None)).unwrap(),
        )
        .unwrap();

        // A new store instance must consult the persisted ledger before its
        // first scan read, not treat the file as first-seen.
        let cache = FileCache::new(test_config(temp.path()));
        assert!(cache.load_document_file("SwiftUI.json").unwrap().is_none());
        assert!(!path.exists());
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn test_eviction_respects_budgets_and_lru_order() {
        let temp = tempdir().unwrap();
        let config = CacheConfig {
            cache_dir: temp.path().to_path_buf(),
            max_bytes: 250 * 1024 * 1024,
            max_entries: 3,
        };
        let cache = FileCache::new(config);

        cache.save_symbol("a", &doc("A", Some("struct"))).unwrap();
        cache.save_symbol("b", &doc("B", Some("struct"))).unwrap();
        cache.save_symbol("c", &doc("C", Some("struct"))).unwrap();

        // Bump a's recency so b becomes the least recently accessed.
        cache.load_symbol("a").unwrap().unwrap();

        cache.save_symbol("d", &doc("D", Some("struct"))).unwrap();

        assert_eq!(cache.entry_count(), 3);
        assert!(temp.path().join("a.json").exists());
        assert!(!temp.path().join("b.json").exists());
        assert!(temp.path().join("c.json").exists());
        assert!(temp.path().join("d.json").exists());
    }

    #[test]
    fn test_byte_budget_enforced() {
        let temp = tempdir().unwrap();
        let config = CacheConfig {
            cache_dir: temp.path().to_path_buf(),
            max_bytes: 400,
            max_entries: 5000,
        };
        let cache = FileCache::new(config);

        for name in ["a", "b", "c", "d", "e"] {
            cache.save_symbol(name, &doc(name, Some("struct"))).unwrap();
        }

        assert!(cache.total_bytes() <= 400);
        assert!(cache.entry_count() < 5);
    }

    #[test]
    fn test_clear_all_preserves_schema_marker() {
        let temp = tempdir().unwrap();
        let cache = FileCache::new(test_config(temp.path()));

        cache.save_framework("SwiftUI", &doc("SwiftUI", None)).unwrap();
        cache.clear_all().unwrap();

        assert!(cache.load_framework("SwiftUI").unwrap().is_none());
        assert_eq!(cache.entry_count(), 0);
        assert!(temp.path().join("cache-schema.json").exists());
    }

    #[test]
    fn test_schema_mismatch_wipes_documents() {
        let temp = tempdir().unwrap();
        {
            let cache = FileCache::new(test_config(temp.path()));
            cache.save_framework("SwiftUI", &doc("SwiftUI", None)).unwrap();
        }

        std::fs::write(
            temp.path().join("cache-schema.json"),
            r#"{"version": 99}"#,
        )
        .unwrap();

        let cache = FileCache::new(test_config(temp.path()));
        assert!(cache.load_framework("SwiftUI").unwrap().is_none());

        let marker: SchemaMarker = serde_json::from_slice(
            &std::fs::read(temp.path().join("cache-schema.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(marker.version, CACHE_SCHEMA_VERSION);
    }

    #[test]
    fn test_technologies_wrapper_and_bare_shapes() {
        let temp = tempdir().unwrap();
        let cache = FileCache::new(test_config(temp.path()));

        let mut technologies = HashMap::new();
        technologies.insert(
            "doc://swiftui".to_string(),
            Technology {
                title: "SwiftUI".to_string(),
                identifier: "doc://swiftui".to_string(),
                ..Default::default()
            },
        );

        // Bare map, as the store persists it.
        cache.save_technologies(&technologies).unwrap();
        let loaded = cache.load_technologies().unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["doc://swiftui"].title, "SwiftUI");

        // Wrapper shape written by an older version. Clear first so the
        // hand-written file is first-seen rather than a hash mismatch.
        let wrapper = serde_json::json!({"references": {
            "doc://uikit": {"title": "UIKit", "identifier": "doc://uikit"}
        }});
        cache.clear_all().unwrap();
        std::fs::write(
            temp.path().join("technologies.json"),
            serde_json::to_vec_pretty(&wrapper).unwrap(),
        )
        .unwrap();

        let loaded = cache.load_technologies().unwrap().unwrap();
        assert_eq!(loaded["doc://uikit"].title, "UIKit");
    }

    #[test]
    fn test_empty_technologies_is_a_miss() {
        let temp = tempdir().unwrap();
        let cache = FileCache::new(test_config(temp.path()));

        std::fs::write(temp.path().join("technologies.json"), b"{}").unwrap();
        assert!(cache.load_technologies().unwrap().is_none());

        std::fs::write(
            temp.path().join("technologies.json"),
            br#"{"references": {}}"#,
        )
        .unwrap();
        assert!(cache.load_technologies().unwrap().is_none());
    }

    #[test]
    fn test_list_document_files_excludes_bookkeeping() {
        let temp = tempdir().unwrap();
        let cache = FileCache::new(test_config(temp.path()));

        cache.save_framework("SwiftUI", &doc("SwiftUI", None)).unwrap();
        cache
            .save_symbol("documentation/swiftui/griditem", &doc("GridItem", Some("struct")))
            .unwrap();

        let files = cache.list_document_files();
        assert_eq!(
            files,
            vec![
                "SwiftUI.json".to_string(),
                "documentation__swiftui__griditem.json".to_string()
            ]
        );
    }
}
