//! `commit` / `patch` producers (§4.H.1). `commit` is a stable envelope
//! item carrying metadata only; `patch` is raw `text/plain` (§8 scenario
//! 3 "no JSON framing") carrying that same metadata as a header plus the
//! unified diff against the commit's first parent (empty tree for a root
//! commit) — it never passes through the envelope.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;

use crate::diff::Diff;
use crate::errors::GitJsonError;
use crate::git_reader::{CommitInfo, GitReader, TreeEntry};
use crate::hash::Oid;

/// Recursively flattens a tree into `(path, blob oid)` pairs, the shape
/// `Diff::diff` expects (§4.H.1 "commit": "file set is the recursive
/// union of both trees' blobs").
fn flatten_tree(reader: &dyn GitReader, tree_oid: &Oid, prefix: &PathBuf, out: &mut Vec<(PathBuf, Oid)>) -> Result<(), GitJsonError> {
    let entries: Vec<TreeEntry> = reader.read_tree(tree_oid)?;
    for entry in entries {
        let path = prefix.join(&entry.name);
        if entry.is_dir() {
            flatten_tree(reader, &entry.oid, &path, out)?;
        } else {
            out.push((path, entry.oid));
        }
    }
    Ok(())
}

pub(crate) fn flatten_commit_tree(reader: &dyn GitReader, tree_oid: &Oid) -> Result<Vec<(PathBuf, Oid)>, GitJsonError> {
    let mut out = Vec::new();
    flatten_tree(reader, tree_oid, &PathBuf::new(), &mut out)?;
    Ok(out)
}

#[derive(Debug, Serialize)]
struct CommitHeaderJson {
    oid: String,
    tree: String,
    parents: Vec<String>,
    author_name: String,
    author_email: String,
    author_time: i64,
    committer_name: String,
    committer_email: String,
    committer_time: i64,
    summary: String,
    body: String,
}

impl From<&CommitInfo> for CommitHeaderJson {
    fn from(c: &CommitInfo) -> Self {
        Self {
            oid: c.oid.as_str().to_string(),
            tree: c.tree.as_str().to_string(),
            parents: c.parents.iter().map(|p| p.as_str().to_string()).collect(),
            author_name: c.author_name.clone(),
            author_email: c.author_email.clone(),
            author_time: c.author_time,
            committer_name: c.committer_name.clone(),
            committer_email: c.committer_email.clone(),
            committer_time: c.committer_time,
            summary: c.summary.clone(),
            body: c.body.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CommitArtifact {
    schema: &'static str,
    job: &'static str,
    commit: CommitHeaderJson,
}

/// Builds the `commit` envelope item for `commit_oid`: metadata only, no
/// diff (§4.H.1's lighter-weight mode; `patch` carries the diff instead).
pub fn build(reader: &dyn GitReader, commit_oid: &Oid) -> Result<Value, GitJsonError> {
    let commit = reader.read_commit(commit_oid)?;
    let artifact = CommitArtifact {
        schema: "libjg2-1",
        job: "commit",
        commit: CommitHeaderJson::from(&commit),
    };
    Ok(serde_json::to_value(&artifact).unwrap_or(Value::Null))
}

/// Builds the raw `text/plain` patch body for `commit_oid` (§4.H.1
/// "patch", §8 scenario 3 "no JSON framing"): an author/date header
/// followed by the commit message and its unified diff against the first
/// parent (empty tree for a root commit).
pub fn build_patch_text(reader: &dyn GitReader, commit_oid: &Oid) -> Result<Vec<u8>, GitJsonError> {
    let commit = reader.read_commit(commit_oid)?;

    let new_files = flatten_commit_tree(reader, &commit.tree)?;
    let old_files = match commit.parents.first() {
        Some(parent_oid) => {
            let parent = reader.read_commit(parent_oid)?;
            flatten_commit_tree(reader, &parent.tree)?
        }
        None => Vec::new(),
    };

    let diffs = Diff::diff(old_files, new_files, Vec::new(), |_path, oid| {
        reader.read_blob(oid).unwrap_or_default()
    });

    let mut out = String::new();
    let _ = write!(
        out,
        "Author: {} <{}>\nDate: {}\n\n{}\n",
        commit.author_name,
        commit.author_email,
        format_commit_time(commit.author_time),
        commit.summary,
    );
    if !commit.body.is_empty() {
        out.push('\n');
        out.push_str(&commit.body);
        out.push('\n');
    }
    for diff in diffs {
        out.push('\n');
        out.push_str(&diff.data);
    }
    Ok(out.into_bytes())
}

/// RFC 2822 rendering of a commit's author time, the format git itself
/// uses in a patch header.
fn format_commit_time(epoch_seconds: i64) -> String {
    use chrono::{TimeZone, Utc};
    match Utc.timestamp_opt(epoch_seconds, 0).single() {
        Some(dt) => dt.to_rfc2822(),
        None => epoch_seconds.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git_reader::{BlameHunk, PathResolution, RawRef};

    struct FixtureReader {
        commits: HashMap<String, CommitInfo>,
        trees: HashMap<String, Vec<TreeEntry>>,
        blobs: HashMap<String, Vec<u8>>,
    }

    impl GitReader for FixtureReader {
        fn list_refs(&self) -> Result<Vec<RawRef>, GitJsonError> {
            Ok(vec![])
        }
        fn resolve(&self, spec: &str) -> Result<Oid, GitJsonError> {
            Ok(Oid::from(spec.to_string()))
        }
        fn read_commit(&self, oid: &Oid) -> Result<CommitInfo, GitJsonError> {
            self.commits
                .get(oid.as_str())
                .cloned()
                .ok_or_else(|| GitJsonError::BackingStore("missing commit".into()))
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

    fn commit(oid: &str, tree: &str, parents: Vec<&str>) -> CommitInfo {
        CommitInfo {
            oid: Oid::from(oid.to_string()),
            tree: Oid::from(tree.to_string()),
            parents: parents.into_iter().map(|p| Oid::from(p.to_string())).collect(),
            author_name: "a".into(),
            author_email: "a@example.com".into(),
            author_time: 1,
            committer_name: "a".into(),
            committer_email: "a@example.com".into(),
            committer_time: 1,
            summary: "msg".into(),
            body: String::new(),
        }
    }

    fn file_entry(name: &str, oid: &str) -> TreeEntry {
        TreeEntry {
            name: name.into(),
            mode: 0o100644,
            oid: Oid::from(oid.to_string()),
            size: None,
        }
    }

    #[test]
    fn commit_mode_carries_no_diff_fields() {
        let mut commits = HashMap::new();
        commits.insert("c1".into(), commit("c1", "t1", vec![]));
        let reader = FixtureReader {
            commits,
            trees: HashMap::new(),
            blobs: HashMap::new(),
        };
        let v = build(&reader, &Oid::from("c1")).unwrap();
        assert_eq!(v["job"], "commit");
        assert!(v.get("files").is_none());
    }

    #[test]
    fn patch_text_diffs_against_first_parent() {
        let mut commits = HashMap::new();
        commits.insert("p1".into(), commit("p1", "tp", vec![]));
        commits.insert("c1".into(), commit("c1", "tc", vec!["p1"]));
        let mut trees = HashMap::new();
        trees.insert("tp".into(), vec![file_entry("a.txt", "blob-old")]);
        trees.insert("tc".into(), vec![file_entry("a.txt", "blob-new")]);
        let mut blobs = HashMap::new();
        blobs.insert("blob-old".into(), b"line one\n".to_vec());
        blobs.insert("blob-new".into(), b"line one changed\n".to_vec());

        let reader = FixtureReader { commits, trees, blobs };
        let bytes = build_patch_text(&reader, &Oid::from("c1")).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("Author: a <a@example.com>"));
        assert!(text.contains("a.txt"));
        assert!(!text.trim_start().starts_with('{'));
    }

    #[test]
    fn root_commit_diffs_against_empty_tree() {
        let mut commits = HashMap::new();
        commits.insert("c1".into(), commit("c1", "tc", vec![]));
        let mut trees = HashMap::new();
        trees.insert("tc".into(), vec![file_entry("a.txt", "blob-new")]);
        let mut blobs = HashMap::new();
        blobs.insert("blob-new".into(), b"hello\n".to_vec());

        let reader = FixtureReader { commits, trees, blobs };
        let bytes = build_patch_text(&reader, &Oid::from("c1")).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("a.txt"));
    }
}
