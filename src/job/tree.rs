//! `tree` producer (§4.H.1) plus the README priority/chaining feature
//! (SPEC_FULL.md supplemented feature): when a directory listing includes
//! a file that can serve as a rendered README, a second item is appended
//! to the envelope's `items` array with that file's content inlined (or
//! a link, if it sniffs as binary).
//!
//! Grounded on `lib/job/tree.c`'s `inline_match[]` table and the
//! re-invocation of the blob-rendering path it does once the directory
//! listing is fully emitted.

use serde::Serialize;
use serde_json::Value;

use crate::errors::GitJsonError;
use crate::git_reader::{looks_binary, GitReader, PathResolution, TreeEntry};
use crate::hash::Oid;

/// Suffix-matched priority table, most preferable first (`tree.c`'s
/// `inline_match[]`: `README.md`(9) > `README`(6) > `.mkd`(4) > `.md`(3)).
/// The first two entries are exact names; the rest are suffix matches.
const INLINE_MATCH: &[&str] = &["README.md", "README", ".mkd", ".md"];

fn match_rank(name: &str) -> Option<usize> {
    INLINE_MATCH.iter().position(|pat| {
        if pat.starts_with("README") {
            name == *pat
        } else {
            name.ends_with(pat)
        }
    })
}

/// Picks the best README candidate across every entry; a later entry only
/// supersedes the current best if it ranks strictly higher (lower index).
pub fn pick_readme(entries: &[TreeEntry]) -> Option<&TreeEntry> {
    let mut best: Option<(usize, &TreeEntry)> = None;
    for e in entries {
        if e.is_dir() {
            continue;
        }
        if let Some(rank) = match_rank(&e.name) {
            match best {
                Some((best_rank, _)) if rank >= best_rank => {}
                _ => best = Some((rank, e)),
            }
        }
    }
    best.map(|(_, e)| e)
}

#[derive(Debug, Serialize)]
struct TreeEntryJson {
    name: String,
    mode: u32,
    oid: String,
    is_dir: bool,
    size: Option<u64>,
}

impl From<&TreeEntry> for TreeEntryJson {
    fn from(e: &TreeEntry) -> Self {
        Self {
            name: e.name.clone(),
            mode: e.mode,
            oid: e.oid.as_str().to_string(),
            is_dir: e.is_dir(),
            size: e.size,
        }
    }
}

#[derive(Debug, Serialize)]
struct TreeArtifact {
    schema: &'static str,
    job: &'static str,
    sub_path: String,
    entries: Vec<TreeEntryJson>,
    readme_name: Option<String>,
}

/// Builds the `tree` envelope items for `commit_oid`/`sub_path` (§4.H.1
/// "tree"): the directory listing, plus a second chained item rendering
/// the picked README's content when one exists.
pub fn build(reader: &dyn GitReader, commit_oid: &Oid, sub_path: &str, repo_name: &str) -> Result<Vec<Value>, GitJsonError> {
    let resolution = reader.resolve_path(commit_oid, sub_path)?;
    let entries = match resolution {
        PathResolution::Tree { entries, .. } => entries,
        PathResolution::Blob { .. } => {
            return Err(GitJsonError::InvalidPath(format!("`{sub_path}` is a file, not a directory")));
        }
        PathResolution::NotFound => {
            return Err(GitJsonError::InvalidPath(format!("`{sub_path}` not found")));
        }
    };

    let readme_entry = pick_readme(&entries).cloned();
    let readme_name = readme_entry.as_ref().map(|e| e.name.clone());
    let artifact = TreeArtifact {
        schema: "libjg2-1",
        job: "tree",
        sub_path: sub_path.to_string(),
        entries: entries.iter().map(TreeEntryJson::from).collect(),
        readme_name,
    };
    let mut items = vec![serde_json::to_value(&artifact).unwrap_or(Value::Null)];

    if let Some(entry) = readme_entry {
        let readme_path = if sub_path.is_empty() {
            entry.name.clone()
        } else {
            format!("{sub_path}/{}", entry.name)
        };
        if let Ok(chained) = build_readme_chain_item(reader, commit_oid, &readme_path, repo_name) {
            items.push(chained);
        }
    }

    Ok(items)
}

/// Second "job" chained onto `tree`'s items array: re-resolves the
/// README's path as a blob and inlines its text, or links to it if binary
/// (`tree.c`: `"blob":"..."` vs `"bloblink":"<repo>/plain/<path>"`).
fn build_readme_chain_item(reader: &dyn GitReader, commit_oid: &Oid, path: &str, repo_name: &str) -> Result<Value, GitJsonError> {
    let resolution = reader.resolve_path(commit_oid, path)?;
    let oid = match resolution {
        PathResolution::Blob { oid, .. } => oid,
        _ => return Err(GitJsonError::InvalidPath(format!("`{path}` is not a file"))),
    };
    let bytes = reader.read_blob(&oid)?;

    let mut map = serde_json::Map::new();
    map.insert("schema".to_string(), Value::String("libjg2-1".to_string()));
    map.insert("oid".to_string(), Value::String(oid.as_str().to_string()));
    map.insert("blobname".to_string(), Value::String(path.to_string()));
    if looks_binary(&bytes) {
        map.insert("bloblink".to_string(), Value::String(format!("{repo_name}/plain/{path}")));
    } else {
        map.insert("blob".to_string(), Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    }
    Ok(Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> TreeEntry {
        TreeEntry {
            name: name.into(),
            mode: 0o100644,
            oid: Oid::from("0".repeat(40)),
            size: Some(10),
        }
    }

    #[test]
    fn readme_md_outranks_bare_readme() {
        let entries = vec![file("README"), file("README.md"), file("main.rs")];
        assert_eq!(pick_readme(&entries).unwrap().name, "README.md");
    }

    #[test]
    fn bare_readme_outranks_mkd_suffix() {
        let entries = vec![file("notes.mkd"), file("README")];
        assert_eq!(pick_readme(&entries).unwrap().name, "README");
    }

    #[test]
    fn mkd_suffix_outranks_md_suffix() {
        let entries = vec![file("guide.md"), file("notes.mkd")];
        assert_eq!(pick_readme(&entries).unwrap().name, "notes.mkd");
    }

    #[test]
    fn exact_readme_name_required_not_suffix() {
        // "MYREADME" ends with "README" textually but isn't the exact name,
        // and isn't a suffix match either (suffix entries are ".mkd"/".md").
        let entries = vec![file("MYREADME")];
        assert!(pick_readme(&entries).is_none());
    }

    #[test]
    fn no_readme_candidate_returns_none() {
        let entries = vec![file("main.rs"), file("lib.rs")];
        assert!(pick_readme(&entries).is_none());
    }

    #[test]
    fn directories_never_match_as_readme() {
        let mut dir = file("README.md");
        dir.mode = 0o040000;
        let entries = vec![dir];
        assert!(pick_readme(&entries).is_none());
    }
}
