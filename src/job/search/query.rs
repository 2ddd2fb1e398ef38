//! Search query modes (§4.H.4): `search` (full text), `ac` (autocomplete
//! over indexed terms), `fp` (filepath substring match).

use serde::Serialize;
use serde_json::Value;

use super::index::SearchIndex;

#[derive(Debug, Serialize)]
struct SearchHit {
    path: String,
    line: u32,
}

#[derive(Debug, Serialize)]
struct SearchArtifact {
    schema: &'static str,
    job: &'static str,
    query: String,
    hits: Vec<SearchHit>,
}

pub const MAX_HITS: usize = 200;

/// `search` mode: exact lowercased-token lookup (§4.H.4 "query: search").
pub fn search(index: &SearchIndex, term: &str) -> Value {
    let token = term.to_ascii_lowercase();
    let mut hits: Vec<SearchHit> = index
        .postings
        .get(&token)
        .map(|postings| {
            postings
                .iter()
                .take(MAX_HITS)
                .map(|p| SearchHit {
                    path: p.path.clone(),
                    line: p.line,
                })
                .collect()
        })
        .unwrap_or_default();
    hits.sort_by(|a, b| a.path.cmp(&b.path).then(a.line.cmp(&b.line)));

    let artifact = SearchArtifact {
        schema: "libjg2-1",
        job: "search",
        query: term.to_string(),
        hits,
    };
    serde_json::to_value(&artifact).unwrap_or(Value::Null)
}

#[derive(Debug, Serialize)]
struct AutocompleteArtifact {
    schema: &'static str,
    job: &'static str,
    prefix: String,
    terms: Vec<String>,
}

pub const MAX_SUGGESTIONS: usize = 20;

/// `ac` mode: every indexed token with `prefix`, alphabetical, capped.
pub fn autocomplete(index: &SearchIndex, prefix: &str) -> Value {
    let needle = prefix.to_ascii_lowercase();
    let mut terms: Vec<&String> = index.postings.keys().filter(|t| t.starts_with(&needle)).collect();
    terms.sort();
    terms.truncate(MAX_SUGGESTIONS);

    let artifact = AutocompleteArtifact {
        schema: "libjg2-1",
        job: "ac",
        prefix: prefix.to_string(),
        terms: terms.into_iter().cloned().collect(),
    };
    serde_json::to_value(&artifact).unwrap_or(Value::Null)
}

#[derive(Debug, Serialize)]
struct FilePathArtifact {
    schema: &'static str,
    job: &'static str,
    query: String,
    paths: Vec<String>,
}

/// `fp` mode: case-insensitive substring match over every indexed path.
pub fn filepath(index: &SearchIndex, needle: &str) -> Value {
    let needle_lower = needle.to_ascii_lowercase();
    let mut matches: Vec<&String> = index
        .paths
        .iter()
        .filter(|p| p.to_ascii_lowercase().contains(&needle_lower))
        .collect();
    matches.sort();
    matches.truncate(MAX_HITS);

    let artifact = FilePathArtifact {
        schema: "libjg2-1",
        job: "fp",
        query: needle.to_string(),
        paths: matches.into_iter().cloned().collect(),
    };
    serde_json::to_value(&artifact).unwrap_or(Value::Null)
}
