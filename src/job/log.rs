//! `log` producer (§4.H.1): paged first-parent commit history.

use serde::Serialize;
use serde_json::Value;

use crate::errors::GitJsonError;
use crate::git_reader::{CommitInfo, GitReader};
use crate::hash::Oid;

#[derive(Debug, Serialize)]
struct LogEntry {
    oid: String,
    parents: Vec<String>,
    author_name: String,
    author_email: String,
    author_time: i64,
    committer_name: String,
    committer_email: String,
    committer_time: i64,
    summary: String,
}

impl From<&CommitInfo> for LogEntry {
    fn from(c: &CommitInfo) -> Self {
        Self {
            oid: c.oid.as_str().to_string(),
            parents: c.parents.iter().map(|p| p.as_str().to_string()).collect(),
            author_name: c.author_name.clone(),
            author_email: c.author_email.clone(),
            author_time: c.author_time,
            committer_name: c.committer_name.clone(),
            committer_email: c.committer_email.clone(),
            committer_time: c.committer_time,
            summary: c.summary.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct LogArtifact {
    schema: &'static str,
    job: &'static str,
    offset: u64,
    count: u32,
    /// Present when another page follows (§4.H.1 "log" paging contract).
    next_offset: Option<u64>,
    entries: Vec<LogEntry>,
}

/// Default and maximum page sizes, matching the teacher's `PAGE_SIZE`
/// convention for list-style endpoints.
pub const DEFAULT_PAGE_COUNT: u32 = 50;
pub const MAX_PAGE_COUNT: u32 = 500;

/// Builds the `log` JSON body starting at `start_oid`, skipping `offset`
/// commits and returning up to `count` entries (§4.H.1).
pub fn build(
    reader: &dyn GitReader,
    start_oid: &Oid,
    offset: u64,
    count: u32,
) -> Result<Value, GitJsonError> {
    let count = count.clamp(1, MAX_PAGE_COUNT);
    let fetch = offset as usize + count as usize + 1;
    let commits = reader.walk_first_parent(start_oid, fetch)?;

    let page: Vec<&CommitInfo> = commits.iter().skip(offset as usize).take(count as usize).collect();
    let has_more = commits.len() as u64 > offset + count as u64;

    let artifact = LogArtifact {
        schema: "libjg2-1",
        job: "log",
        offset,
        count: page.len() as u32,
        next_offset: has_more.then_some(offset + count as u64),
        entries: page.into_iter().map(LogEntry::from).collect(),
    };
    Ok(serde_json::to_value(&artifact).unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git_reader::{BlameHunk, PathResolution, RawRef, TreeEntry};

    struct FixtureReader {
        commits: Vec<CommitInfo>,
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
                .iter()
                .find(|c| &c.oid == oid)
                .cloned()
                .ok_or_else(|| GitJsonError::BackingStore("missing".into()))
        }
        fn walk_first_parent(&self, oid: &Oid, count: usize) -> Result<Vec<CommitInfo>, GitJsonError> {
            let start = self.commits.iter().position(|c| &c.oid == oid).unwrap_or(0);
            Ok(self.commits[start..].iter().take(count).cloned().collect())
        }
        fn read_tree(&self, _oid: &Oid) -> Result<Vec<TreeEntry>, GitJsonError> {
            unimplemented!()
        }
        fn resolve_path(&self, _c: &Oid, _s: &str) -> Result<PathResolution, GitJsonError> {
            unimplemented!()
        }
        fn read_blob(&self, _oid: &Oid) -> Result<Vec<u8>, GitJsonError> {
            unimplemented!()
        }
        fn blame(&self, _c: &Oid, _p: &str) -> Result<Vec<BlameHunk>, GitJsonError> {
            unimplemented!()
        }
    }

    fn commit(n: u8) -> CommitInfo {
        CommitInfo {
            oid: Oid::from(format!("{:040}", n)),
            tree: Oid::from("t".to_string()),
            parents: vec![],
            author_name: "a".into(),
            author_email: "a@example.com".into(),
            author_time: 100 + n as i64,
            committer_name: "a".into(),
            committer_email: "a@example.com".into(),
            committer_time: 100 + n as i64,
            summary: format!("commit {n}"),
            body: String::new(),
        }
    }

    #[test]
    fn builds_page_with_next_offset() {
        let reader = FixtureReader {
            commits: (0..10).map(commit).collect(),
        };
        let v = build(&reader, &commit(0).oid, 0, 5).unwrap();
        assert_eq!(v["entries"].as_array().unwrap().len(), 5);
        assert_eq!(v["next_offset"], 5);
    }

    #[test]
    fn last_page_has_no_next_offset() {
        let reader = FixtureReader {
            commits: (0..3).map(commit).collect(),
        };
        let v = build(&reader, &commit(0).oid, 0, 50).unwrap();
        assert_eq!(v["entries"].as_array().unwrap().len(), 3);
        assert!(v["next_offset"].is_null());
    }
}
