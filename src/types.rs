//! Wire and document model for the documentation API.
//!
//! Framework and symbol documents share one shape; which one a document is
//! gets decided once via [`DocDocument::kind`] instead of re-checking fields
//! at every access.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A documentation document as returned by the remote API.
///
/// `metadata` and `abstract` are required: a cached JSON file without them
/// (for example the technology catalog) fails structural validation and is
/// skipped by the symbol index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocDocument {
    pub metadata: DocMetadata,
    #[serde(rename = "abstract")]
    pub abstract_nodes: Vec<InlineNode>,
    /// Keyed by reference identifier; ordered so ingest is deterministic.
    #[serde(default)]
    pub references: BTreeMap<String, Reference>,
    #[serde(default)]
    pub topic_sections: Vec<TopicSection>,
}

/// Which family a document belongs to, decided at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocKind {
    Framework,
    Symbol,
}

impl DocDocument {
    pub fn kind(&self) -> DocKind {
        if self.metadata.symbol_kind.is_some() {
            DocKind::Symbol
        } else {
            DocKind::Framework
        }
    }

    /// Symbol kind string, defaulting to `"framework"` for framework docs.
    pub fn kind_label(&self) -> &str {
        self.metadata.symbol_kind.as_deref().unwrap_or("framework")
    }

    pub fn title(&self) -> &str {
        self.metadata.title.as_deref().unwrap_or("Unknown")
    }

    pub fn url(&self) -> &str {
        self.metadata.url.as_deref().unwrap_or("")
    }

    pub fn abstract_text(&self) -> String {
        extract_plain_text(&self.abstract_nodes)
    }

    pub fn platform_names(&self) -> Vec<String> {
        self.metadata
            .platforms
            .iter()
            .filter_map(|p| p.name.clone())
            .collect()
    }

    /// Every identifier reachable from this document: topic section members
    /// first, then reference map keys. Deduplicated, insertion order kept.
    pub fn all_identifiers(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut identifiers = Vec::new();

        for section in &self.topic_sections {
            for id in &section.identifiers {
                if seen.insert(id.clone()) {
                    identifiers.push(id.clone());
                }
            }
        }

        for ref_id in self.references.keys() {
            if seen.insert(ref_id.clone()) {
                identifiers.push(ref_id.clone());
            }
        }

        identifiers
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocMetadata {
    pub title: Option<String>,
    pub url: Option<String>,
    pub symbol_kind: Option<String>,
    pub role: Option<String>,
    pub platforms: Vec<PlatformInfo>,
}

/// An entry in a document's reference map: a linked symbol's title, path,
/// kind, and abstract without its full document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Reference {
    pub title: Option<String>,
    pub url: Option<String>,
    pub kind: Option<String>,
    pub role: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_nodes: Vec<InlineNode>,
    pub platforms: Vec<PlatformInfo>,
}

impl Reference {
    pub fn abstract_text(&self) -> String {
        extract_plain_text(&self.abstract_nodes)
    }

    pub fn platform_names(&self) -> Vec<String> {
        self.platforms.iter().filter_map(|p| p.name.clone()).collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TopicSection {
    pub title: Option<String>,
    pub identifiers: Vec<String>,
}

/// One entry of the technology catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Technology {
    pub title: String,
    pub identifier: String,
    pub url: Option<String>,
    pub kind: Option<String>,
    pub tags: Vec<String>,
}

impl Technology {
    /// Catalog entries without a title or identifier are not usable.
    pub fn looks_valid(&self) -> bool {
        !self.title.is_empty() || !self.identifier.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlatformInfo {
    pub name: Option<String>,
    pub introduced_at: Option<String>,
    pub beta: Option<bool>,
}

/// A structured-abstract node. The API nests rich text arbitrarily deep, so
/// everything is optional and unknown node types degrade to their children.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InlineNode {
    #[serde(rename = "type")]
    pub node_type: String,
    pub text: Option<String>,
    pub code: Option<String>,
    pub inline_content: Vec<InlineNode>,
}

/// Flatten a rich abstract into plain text. Pure and total: malformed or
/// empty input yields an empty string, never an error.
pub fn extract_plain_text(nodes: &[InlineNode]) -> String {
    let mut out = String::new();
    collect_text(nodes, &mut out);
    out.trim().to_string()
}

fn collect_text(nodes: &[InlineNode], out: &mut String) {
    for node in nodes {
        if let Some(text) = &node.text {
            out.push_str(text);
        } else if let Some(code) = &node.code {
            out.push_str(code);
        }
        collect_text(&node.inline_content, out);
    }
}

/// Render a platform list as a display string, e.g. `iOS 14.0+, macOS 11.0+`.
pub fn format_platforms(platforms: &[PlatformInfo]) -> String {
    platforms
        .iter()
        .filter_map(|p| {
            let name = p.name.as_deref()?;
            let mut label = name.to_string();
            if let Some(version) = &p.introduced_at {
                label.push_str(&format!(" {}+", version));
            }
            if p.beta == Some(true) {
                label.push_str(" (Beta)");
            }
            Some(label)
        })
        .collect::<Vec<_>>()
        .join(", ")
}
