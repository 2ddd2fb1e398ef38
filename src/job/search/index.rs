//! Full-text search indexer (§4.H.4): builds an inverted index of
//! lowercased word tokens -> postings, over every text file in a commit's
//! tree, and persists it via the disk cache (bincode-encoded).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use dashmap::DashSet;
use serde::{Deserialize, Serialize};

use crate::errors::GitJsonError;
use crate::git_reader::{looks_binary, GitReader};
use crate::hash::Oid;
use crate::job::commit::flatten_commit_tree;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Posting {
    pub path: String,
    pub line: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchIndex {
    pub commit_oid: String,
    pub postings: HashMap<String, Vec<Posting>>,
    /// Every indexed file path, for the `fp` (filepath) query mode.
    pub paths: Vec<String>,
}

fn tokenize(line: &str) -> impl Iterator<Item = String> + '_ {
    line.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_lowercase())
}

/// Builds a fresh index for `commit_oid`'s tree (§4.H.4 "index build").
/// Files that sniff as binary are indexed by path only (for `fp`) but
/// contribute no word postings.
pub fn build(reader: &dyn GitReader, commit_oid: &Oid) -> Result<SearchIndex, GitJsonError> {
    let commit = reader.read_commit(commit_oid)?;
    let entries = flatten_commit_tree(reader, &commit.tree)?;

    let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();
    let mut paths = Vec::with_capacity(entries.len());

    for (path, oid) in entries {
        let path_str = path_to_string(&path);
        paths.push(path_str.clone());

        let bytes = reader.read_blob(&oid)?;
        if looks_binary(&bytes) {
            continue;
        }
        let text = String::from_utf8_lossy(&bytes);
        for (line_no, line) in text.lines().enumerate() {
            for token in tokenize(line) {
                postings.entry(token).or_default().push(Posting {
                    path: path_str.clone(),
                    line: line_no as u32 + 1,
                });
            }
        }
    }

    Ok(SearchIndex {
        commit_oid: commit_oid.as_str().to_string(),
        postings,
        paths,
    })
}

fn path_to_string(path: &PathBuf) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Serializes an index for disk-cache storage (§4.H.4).
pub fn encode(index: &SearchIndex) -> Result<Vec<u8>, GitJsonError> {
    bincode::serialize(index).map_err(|e| GitJsonError::SearchIndex(e.to_string()))
}

pub fn decode(bytes: &[u8]) -> Result<SearchIndex, GitJsonError> {
    bincode::deserialize(bytes).map_err(|e| GitJsonError::SearchIndex(e.to_string()))
}

/// Tracks which (repo, commit) pairs currently have a build in flight, so
/// two concurrent requests for the same stale index don't duplicate the
/// work (§4.H.4 "ongoing-index marker").
#[derive(Default)]
pub struct IndexRegistry {
    ongoing: DashSet<String>,
    ready: Mutex<HashMap<String, Arc<SearchIndex>>>,
}

impl IndexRegistry {
    /// Returns `true` if this caller won the race to build `key` (and must
    /// call `publish` when done); `false` means another caller is already
    /// building it.
    pub fn start_build(&self, key: &str) -> bool {
        self.ongoing.insert(key.to_string())
    }

    pub fn publish(&self, key: &str, index: SearchIndex) {
        self.ready.lock().unwrap().insert(key.to_string(), Arc::new(index));
        self.ongoing.remove(key);
    }

    pub fn get(&self, key: &str) -> Option<Arc<SearchIndex>> {
        self.ready.lock().unwrap().get(key).cloned()
    }

    pub fn is_building(&self, key: &str) -> bool {
        self.ongoing.contains(key)
    }

    /// Releases a build lock won via `start_build` without publishing,
    /// so a failed build doesn't wedge `key` as permanently "ongoing".
    pub fn cancel_build(&self, key: &str) {
        self.ongoing.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git_reader::{BlameHunk, CommitInfo, PathResolution, RawRef, TreeEntry};
    use std::collections::HashMap as Map;

    struct FixtureReader {
        commits: Map<String, CommitInfo>,
        trees: Map<String, Vec<TreeEntry>>,
        blobs: Map<String, Vec<u8>>,
    }

    impl GitReader for FixtureReader {
        fn list_refs(&self) -> Result<Vec<RawRef>, GitJsonError> {
            Ok(vec![])
        }
        fn resolve(&self, spec: &str) -> Result<Oid, GitJsonError> {
            Ok(Oid::from(spec.to_string()))
        }
        fn read_commit(&self, oid: &Oid) -> Result<CommitInfo, GitJsonError> {
            self.commits.get(oid.as_str()).cloned().ok_or_else(|| GitJsonError::BackingStore("missing".into()))
        }
        fn walk_first_parent(&self, _oid: &Oid, _count: usize) -> Result<Vec<CommitInfo>, GitJsonError> {
            unimplemented!()
        }
        fn read_tree(&self, oid: &Oid) -> Result<Vec<TreeEntry>, GitJsonError> {
            Ok(self.trees.get(oid.as_str()).cloned().unwrap_or_default())
        }
        fn resolve_path(&self, _c: &Oid, _s: &str) -> Result<PathResolution, GitJsonError> {
            unimplemented!()
        }
        fn read_blob(&self, oid: &Oid) -> Result<Vec<u8>, GitJsonError> {
            Ok(self.blobs.get(oid.as_str()).cloned().unwrap_or_default())
        }
        fn blame(&self, _c: &Oid, _p: &str) -> Result<Vec<BlameHunk>, GitJsonError> {
            unimplemented!()
        }
    }

    fn fixture() -> FixtureReader {
        let mut commits = Map::new();
        commits.insert(
            "c1".to_string(),
            CommitInfo {
                oid: Oid::from("c1"),
                tree: Oid::from("t1"),
                parents: vec![],
                author_name: "a".into(),
                author_email: "a@example.com".into(),
                author_time: 1,
                committer_name: "a".into(),
                committer_email: "a@example.com".into(),
                committer_time: 1,
                summary: "init".into(),
                body: String::new(),
            },
        );
        let mut trees = Map::new();
        trees.insert(
            "t1".to_string(),
            vec![TreeEntry {
                name: "lib.rs".into(),
                mode: 0o100644,
                oid: Oid::from("b1"),
                size: None,
            }],
        );
        let mut blobs = Map::new();
        blobs.insert("b1".to_string(), b"fn hello_world() {}\n".to_vec());
        FixtureReader { commits, trees, blobs }
    }

    #[test]
    fn build_indexes_tokens_from_file_content() {
        let reader = fixture();
        let index = build(&reader, &Oid::from("c1")).unwrap();
        assert!(index.postings.contains_key("hello_world"));
        assert_eq!(index.postings["hello_world"][0].path, "lib.rs");
    }

    #[test]
    fn encode_decode_round_trips() {
        let reader = fixture();
        let index = build(&reader, &Oid::from("c1")).unwrap();
        let bytes = encode(&index).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.commit_oid, index.commit_oid);
        assert_eq!(decoded.postings.len(), index.postings.len());
    }

    #[test]
    fn registry_prevents_duplicate_concurrent_build() {
        let registry = IndexRegistry::default();
        assert!(registry.start_build("repo@c1"));
        assert!(!registry.start_build("repo@c1"));
        registry.publish("repo@c1", SearchIndex::default());
        assert!(!registry.is_building("repo@c1"));
        assert!(registry.get("repo@c1").is_some());
    }
}
