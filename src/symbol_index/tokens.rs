//! Tokenization, synonym expansion, and query scoring shared by both index
//! scopes.

use std::collections::HashSet;

use regex::{Regex, RegexBuilder};

use super::SymbolEntry;

/// Fixed seed-term synonym table. Applied to query tokens only; indexed
/// documents are never pre-expanded.
fn synonyms_for(token: &str) -> &'static [&'static str] {
    match token {
        "auth" => &["authentication", "authorize", "oauth", "signin"],
        "notification" => &["push", "alert"],
        "tabbar" => &["tab", "tabs"],
        "modal" => &["sheet", "dialog"],
        "db" => &["database", "storage"],
        "net" => &["network", "networking"],
        _ => &[],
    }
}

/// Split text into search tokens: whitespace and `/ . _ -` delimit pieces;
/// each piece is emitted in original and lower case, and camel/Pascal pieces
/// additionally yield their sub-words plus the lowercase concatenation.
///
/// `GridItem` -> `{GridItem, griditem, Grid, grid, Item, item}`.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |tokens: &mut Vec<String>, seen: &mut HashSet<String>, token: String| {
        if !token.is_empty() && seen.insert(token.clone()) {
            tokens.push(token);
        }
    };

    for piece in text.split(|c: char| c.is_whitespace() || matches!(c, '/' | '.' | '_' | '-')) {
        if piece.is_empty() {
            continue;
        }

        push(&mut tokens, &mut seen, piece.to_lowercase());
        push(&mut tokens, &mut seen, piece.to_string());

        let parts = split_camel(piece);
        if parts.len() > 1 {
            for part in &parts {
                push(&mut tokens, &mut seen, part.to_lowercase());
                push(&mut tokens, &mut seen, part.clone());
            }
            push(&mut tokens, &mut seen, parts.concat().to_lowercase());
        }
    }

    tokens
}

/// Split before every uppercase transition: `GridItem` -> `[Grid, Item]`.
fn split_camel(piece: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    for c in piece.chars() {
        if c.is_uppercase() && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Lowercase query tokens plus any mapped synonyms.
pub fn expand_tokens(tokens: &[String]) -> Vec<String> {
    let mut expanded = Vec::new();
    let mut seen = HashSet::new();

    for token in tokens {
        let normalized = token.to_lowercase();
        if seen.insert(normalized.clone()) {
            expanded.push(normalized.clone());
        }
        for synonym in synonyms_for(&normalized) {
            let synonym = synonym.to_lowercase();
            if seen.insert(synonym.clone()) {
                expanded.push(synonym);
            }
        }
    }

    expanded
}

/// A query compiled once, applied to every entry.
pub enum QueryMatcher {
    /// Anchored case-insensitive pattern (`*` -> `.*`, `?` -> `.`); a match
    /// scores a flat 100.
    Wildcard(Option<Regex>),
    /// Expanded lowercase tokens for additive scoring.
    Scored(Vec<String>),
}

impl QueryMatcher {
    pub fn new(query: &str) -> Self {
        if query.contains('*') || query.contains('?') {
            QueryMatcher::Wildcard(compile_wildcard(query))
        } else {
            QueryMatcher::Scored(expand_tokens(&tokenize(query)))
        }
    }

    /// The expanded token list, for match explanations.
    pub fn tokens(&self) -> Vec<String> {
        match self {
            QueryMatcher::Wildcard(_) => Vec::new(),
            QueryMatcher::Scored(tokens) => tokens.clone(),
        }
    }

    /// Score an entry: wildcard is match/no-match (100/0) over title, path,
    /// and tokens; scored mode awards +50 per token found in the title, +30
    /// per exact token-set hit, +10 per abstract hit.
    pub fn score(&self, entry: &SymbolEntry) -> u32 {
        match self {
            QueryMatcher::Wildcard(regex) => {
                let Some(regex) = regex else {
                    return 0;
                };
                let matched = regex.is_match(&entry.title)
                    || regex.is_match(&entry.path)
                    || entry.tokens.iter().any(|token| regex.is_match(token));
                if matched {
                    100
                } else {
                    0
                }
            }
            QueryMatcher::Scored(tokens) => {
                let title = entry.title.to_lowercase();
                let abstract_text = entry.abstract_text.to_lowercase();
                let mut score = 0;
                for token in tokens {
                    if title.contains(token.as_str()) {
                        score += 50;
                    }
                    if entry.tokens.contains(token.as_str()) {
                        score += 30;
                    }
                    if abstract_text.contains(token.as_str()) {
                        score += 10;
                    }
                }
                score
            }
        }
    }
}

fn compile_wildcard(query: &str) -> Option<Regex> {
    let mut pattern = String::from("^");
    for c in query.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');

    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .ok()
}
