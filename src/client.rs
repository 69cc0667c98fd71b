//! Cache-through documentation accessors.
//!
//! `DocsClient` layers the durable file store under a remote fetcher: reads
//! hit the store first and only go to the network on a miss, and every
//! successful fetch is written back. Generic over [`DocFetcher`] so tests
//! run against a scripted transport.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::cache::{CacheError, FileCache};
use crate::http_client::{DocFetcher, FetchError, HealthStatus, HttpClient};
use crate::types::{format_platforms, DocDocument, Technology};

const TECHNOLOGIES_PATH: &str = "documentation/technologies";

#[derive(Debug)]
pub enum ClientError {
    Fetch(FetchError),
    Cache(CacheError),
    Decode(serde_json::Error),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Fetch(e) => write!(f, "fetch failed: {}", e),
            ClientError::Cache(e) => write!(f, "cache error: {}", e),
            ClientError::Decode(e) => write!(f, "unexpected document shape: {}", e),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Fetch(e) => Some(e),
            ClientError::Cache(e) => Some(e),
            ClientError::Decode(e) => Some(e),
        }
    }
}

impl From<FetchError> for ClientError {
    fn from(e: FetchError) -> Self {
        ClientError::Fetch(e)
    }
}

impl From<CacheError> for ClientError {
    fn from(e: CacheError) -> Self {
        ClientError::Cache(e)
    }
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub max_results: usize,
    pub platform: Option<String>,
    pub symbol_type: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: 20,
            platform: None,
            symbol_type: None,
        }
    }
}

/// A hit from scanning a framework document's reference map.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkSearchResult {
    pub title: String,
    pub framework: String,
    pub path: String,
    pub description: String,
    pub symbol_kind: Option<String>,
    pub platforms: String,
}

pub struct DocsClient<F: DocFetcher> {
    fetcher: F,
    cache: FileCache,
}

impl<F: DocFetcher> DocsClient<F> {
    pub fn new(fetcher: F, cache: FileCache) -> Self {
        Self { fetcher, cache }
    }

    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    #[cfg(test)]
    pub(crate) fn fetcher_for_tests(&self) -> &F {
        &self.fetcher
    }

    pub async fn get_framework(&self, name: &str) -> Result<DocDocument, ClientError> {
        if let Some(document) = self.cache.load_framework(name)? {
            return Ok(document);
        }
        self.refresh_framework(name).await
    }

    /// Fetch the framework document from the network regardless of cache
    /// state and persist it.
    pub async fn refresh_framework(&self, name: &str) -> Result<DocDocument, ClientError> {
        let path = format!("documentation/{}", name.to_lowercase());
        let value = self.fetcher.fetch_document(&path).await?;
        let document: DocDocument = serde_json::from_value(value).map_err(ClientError::Decode)?;
        self.cache.save_framework(name, &document)?;
        Ok(document)
    }

    pub async fn get_symbol(&self, path: &str) -> Result<DocDocument, ClientError> {
        let path = path.trim_start_matches('/');
        if let Some(document) = self.cache.load_symbol(path)? {
            return Ok(document);
        }

        let value = self.fetcher.fetch_document(path).await?;
        let document: DocDocument = serde_json::from_value(value).map_err(ClientError::Decode)?;
        self.cache.save_symbol(path, &document)?;
        Ok(document)
    }

    pub async fn get_technologies(&self) -> Result<HashMap<String, Technology>, ClientError> {
        if let Some(technologies) = self.cache.load_technologies()? {
            return Ok(technologies);
        }
        self.refresh_technologies().await
    }

    /// Refetch the catalog. The upstream response wraps the map in a
    /// `references` field; a bare map is accepted as a fallback. An empty
    /// result is returned as-is and stays a cache miss for the next call.
    pub async fn refresh_technologies(&self) -> Result<HashMap<String, Technology>, ClientError> {
        let value = self.fetcher.fetch_document(TECHNOLOGIES_PATH).await?;

        let payload = match value.get("references") {
            Some(references) => references.clone(),
            None => value,
        };
        let technologies: HashMap<String, Technology> =
            serde_json::from_value(payload).map_err(ClientError::Decode)?;

        if !technologies.is_empty() {
            self.cache.save_technologies(&technologies)?;
        }
        Ok(technologies)
    }

    /// Case-insensitive substring scan over a framework's reference map.
    /// Cheaper than the token index and usable before one is built.
    pub async fn search_framework(
        &self,
        framework_name: &str,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<FrameworkSearchResult>, ClientError> {
        let framework = self.get_framework(framework_name).await?;
        let needle = query.to_lowercase();
        let mut results = Vec::new();

        for reference in framework.references.values() {
            if results.len() >= options.max_results {
                break;
            }

            let title = reference.title.as_deref().unwrap_or("");
            let description = reference.abstract_text();
            if !title.to_lowercase().contains(&needle)
                && !description.to_lowercase().contains(&needle)
            {
                continue;
            }

            if let Some(symbol_type) = &options.symbol_type {
                let matches = reference
                    .kind
                    .as_deref()
                    .is_some_and(|kind| kind.eq_ignore_ascii_case(symbol_type));
                if !matches {
                    continue;
                }
            }

            if let Some(platform) = &options.platform {
                let platform = platform.to_lowercase();
                let matches = reference.platforms.iter().any(|p| {
                    p.name
                        .as_deref()
                        .is_some_and(|name| name.to_lowercase().contains(&platform))
                });
                if !matches {
                    continue;
                }
            }

            let platforms = if reference.platforms.is_empty() {
                format_platforms(&framework.metadata.platforms)
            } else {
                format_platforms(&reference.platforms)
            };

            results.push(FrameworkSearchResult {
                title: if title.is_empty() {
                    "Symbol".to_string()
                } else {
                    title.to_string()
                },
                framework: framework_name.to_string(),
                path: reference.url.clone().unwrap_or_default(),
                description,
                symbol_kind: reference.kind.clone(),
                platforms,
            });
        }

        Ok(results)
    }

    /// Drop both layers: durable files and the transport's memory cache.
    pub fn clear_cache(&self) -> Result<(), ClientError> {
        self.cache.clear_all()?;
        self.fetcher.clear_transport_cache();
        Ok(())
    }
}

impl DocsClient<HttpClient> {
    pub async fn check_health(&self) -> HealthStatus {
        self.fetcher.check_health().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::http_client::testing::MockFetcher;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    fn client_with(temp: &tempfile::TempDir) -> DocsClient<MockFetcher> {
        DocsClient::new(
            MockFetcher::new(),
            FileCache::new(CacheConfig::with_dir(temp.path().to_path_buf())),
        )
    }

    fn framework_json() -> Value {
        json!({
            "metadata": {
                "title": "SwiftUI",
                "url": "/documentation/swiftui",
                "platforms": [{"name": "iOS", "introducedAt": "13.0"}]
            },
            "abstract": [{"type": "text", "text": "Declare the interface"}],
            "references": {
                "doc://swiftui/griditem": {
                    "title": "GridItem",
                    "url": "/documentation/swiftui/griditem",
                    "kind": "symbol",
                    "abstract": [{"type": "text", "text": "A single item of a grid"}],
                    "platforms": [{"name": "iOS", "introducedAt": "14.0"}]
                },
                "doc://swiftui/list": {
                    "title": "List",
                    "url": "/documentation/swiftui/list",
                    "kind": "collection",
                    "abstract": [{"type": "text", "text": "A grid-adjacent container"}]
                }
            }
        })
    }

    #[tokio::test]
    async fn test_get_framework_fetches_once_then_serves_from_cache() {
        let temp = tempdir().unwrap();
        let client = client_with(&temp);
        client
            .fetcher
            .respond("documentation/swiftui", framework_json());

        let first = client.get_framework("SwiftUI").await.unwrap();
        assert_eq!(first.title(), "SwiftUI");
        assert_eq!(client.fetcher.fetches(), 1);

        let second = client.get_framework("SwiftUI").await.unwrap();
        assert_eq!(second.title(), "SwiftUI");
        assert_eq!(client.fetcher.fetches(), 1);
    }

    #[tokio::test]
    async fn test_get_symbol_strips_leading_slash() {
        let temp = tempdir().unwrap();
        let client = client_with(&temp);
        client.fetcher.respond(
            "documentation/swiftui/griditem",
            json!({
                "metadata": {"title": "GridItem", "symbolKind": "struct"},
                "abstract": [],
            }),
        );

        let doc = client
            .get_symbol("/documentation/swiftui/griditem")
            .await
            .unwrap();
        assert_eq!(doc.title(), "GridItem");

        // Cached under the normalized path.
        assert!(temp
            .path()
            .join("documentation__swiftui__griditem.json")
            .exists());
    }

    #[tokio::test]
    async fn test_fetch_failure_surfaces_as_client_error() {
        let temp = tempdir().unwrap();
        let client = client_with(&temp);

        let error = client.get_framework("Nothing").await.unwrap_err();
        assert!(matches!(error, ClientError::Fetch(FetchError::Status(404, _))));
    }

    #[tokio::test]
    async fn test_undecodable_document_is_a_decode_error() {
        let temp = tempdir().unwrap();
        let client = client_with(&temp);
        client
            .fetcher
            .respond("documentation/swiftui", json!({"no": "metadata"}));

        let error = client.get_framework("SwiftUI").await.unwrap_err();
        assert!(matches!(error, ClientError::Decode(_)));
    }

    #[tokio::test]
    async fn test_technologies_unwraps_references_and_caches() {
        let temp = tempdir().unwrap();
        let client = client_with(&temp);
        client.fetcher.respond(
            "documentation/technologies",
            json!({"references": {
                "doc://swiftui": {"title": "SwiftUI", "identifier": "doc://swiftui"}
            }}),
        );

        let technologies = client.get_technologies().await.unwrap();
        assert_eq!(technologies["doc://swiftui"].title, "SwiftUI");
        assert_eq!(client.fetcher.fetches(), 1);

        client.get_technologies().await.unwrap();
        assert_eq!(client.fetcher.fetches(), 1);
    }

    #[tokio::test]
    async fn test_empty_technologies_refetches_next_call() {
        let temp = tempdir().unwrap();
        let client = client_with(&temp);
        client
            .fetcher
            .respond("documentation/technologies", json!({"references": {}}));

        assert!(client.get_technologies().await.unwrap().is_empty());
        client.get_technologies().await.unwrap();
        assert_eq!(client.fetcher.fetches(), 2);
    }

    #[tokio::test]
    async fn test_search_framework_filters_and_formats() {
        let temp = tempdir().unwrap();
        let client = client_with(&temp);
        client
            .fetcher
            .respond("documentation/swiftui", framework_json());

        let results = client
            .search_framework("SwiftUI", "grid", &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);

        // Symbol kind filter keeps only the struct reference.
        let results = client
            .search_framework(
                "SwiftUI",
                "grid",
                &SearchOptions {
                    symbol_type: Some("symbol".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "GridItem");
        assert_eq!(results[0].platforms, "iOS 14.0+");

        // Platform filter: the List reference has no platforms of its own.
        let results = client
            .search_framework(
                "SwiftUI",
                "grid",
                &SearchOptions {
                    platform: Some("ios".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);

        let results = client
            .search_framework(
                "SwiftUI",
                "grid",
                &SearchOptions {
                    max_results: 1,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_refetch() {
        let temp = tempdir().unwrap();
        let client = client_with(&temp);
        client
            .fetcher
            .respond("documentation/swiftui", framework_json());

        client.get_framework("SwiftUI").await.unwrap();
        client.clear_cache().unwrap();
        client.get_framework("SwiftUI").await.unwrap();
        assert_eq!(client.fetcher.fetches(), 2);
    }
}
