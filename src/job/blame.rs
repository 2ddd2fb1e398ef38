//! `blame` producer (§4.H.3): two-stage aggregation of per-line blame
//! hunks into contiguous runs attributed to one commit, then resolves
//! each run's owning commit's author for display.

use serde::Serialize;
use serde_json::Value;

use crate::errors::GitJsonError;
use crate::git_reader::{BlameHunk, GitReader};
use crate::hash::Oid;

#[derive(Debug, Serialize, PartialEq, Eq)]
struct BlameRun {
    commit: String,
    author_name: String,
    author_email: String,
    /// 1-based, inclusive final-file line range.
    start_line: u32,
    line_count: u32,
}

#[derive(Debug, Serialize)]
struct BlameArtifact {
    schema: &'static str,
    job: &'static str,
    path: String,
    runs: Vec<BlameRun>,
}

/// Stage 1 (§4.H.3 "first pass"): coalesces adjacent hunks attributed to
/// the same final commit into a single run, since the backend may report
/// line-granular hunks that a diff-based blame naturally fragments.
fn coalesce(hunks: &[BlameHunk]) -> Vec<(Oid, u32, u32)> {
    let mut runs: Vec<(Oid, u32, u32)> = Vec::new();
    for hunk in hunks {
        match runs.last_mut() {
            Some((commit, _start, count)) if *commit == hunk.final_commit => {
                *count += hunk.lines;
            }
            _ => runs.push((hunk.final_commit.clone(), hunk.final_start, hunk.lines)),
        }
    }
    runs
}

/// Stage 2: resolves each coalesced run's commit to author identity.
pub fn build(reader: &dyn GitReader, commit_oid: &Oid, path: &str) -> Result<Value, GitJsonError> {
    let hunks = reader.blame(commit_oid, path)?;
    let coalesced = coalesce(&hunks);

    let mut runs = Vec::with_capacity(coalesced.len());
    for (commit, start, count) in coalesced {
        let info = reader.read_commit(&commit)?;
        runs.push(BlameRun {
            commit: commit.as_str().to_string(),
            author_name: info.author_name,
            author_email: info.author_email,
            start_line: start,
            line_count: count,
        });
    }

    let artifact = BlameArtifact {
        schema: "libjg2-1",
        job: "blame",
        path: path.to_string(),
        runs,
    };
    Ok(serde_json::to_value(&artifact).unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git_reader::{CommitInfo, PathResolution, RawRef, TreeEntry};
    use std::collections::HashMap;

    struct FixtureReader {
        hunks: Vec<BlameHunk>,
        commits: HashMap<String, CommitInfo>,
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
            Ok(self.hunks.clone())
        }
    }

    fn commit_info(oid: &str, name: &str) -> CommitInfo {
        CommitInfo {
            oid: Oid::from(oid.to_string()),
            tree: Oid::from("t".to_string()),
            parents: vec![],
            author_name: name.into(),
            author_email: format!("{name}@example.com"),
            author_time: 1,
            committer_name: name.into(),
            committer_email: format!("{name}@example.com"),
            committer_time: 1,
            summary: "x".into(),
            body: String::new(),
        }
    }

    #[test]
    fn adjacent_hunks_from_same_commit_coalesce() {
        let hunks = vec![
            BlameHunk {
                orig_commit: Oid::from("c1"),
                final_commit: Oid::from("c1"),
                orig_start: 1,
                final_start: 1,
                lines: 3,
            },
            BlameHunk {
                orig_commit: Oid::from("c1"),
                final_commit: Oid::from("c1"),
                orig_start: 4,
                final_start: 4,
                lines: 2,
            },
        ];
        let runs = coalesce(&hunks);
        assert_eq!(runs, vec![(Oid::from("c1"), 1, 5)]);
    }

    #[test]
    fn different_commits_produce_separate_runs() {
        let hunks = vec![
            BlameHunk {
                orig_commit: Oid::from("c1"),
                final_commit: Oid::from("c1"),
                orig_start: 1,
                final_start: 1,
                lines: 2,
            },
            BlameHunk {
                orig_commit: Oid::from("c2"),
                final_commit: Oid::from("c2"),
                orig_start: 3,
                final_start: 3,
                lines: 1,
            },
        ];
        assert_eq!(coalesce(&hunks).len(), 2);
    }

    #[test]
    fn build_resolves_author_identity_per_run() {
        let mut commits = HashMap::new();
        commits.insert("c1".into(), commit_info("c1", "alice"));
        let reader = FixtureReader {
            hunks: vec![BlameHunk {
                orig_commit: Oid::from("c1"),
                final_commit: Oid::from("c1"),
                orig_start: 1,
                final_start: 1,
                lines: 5,
            }],
            commits,
        };
        let v = build(&reader, &Oid::from("head"), "src/lib.rs").unwrap();
        assert_eq!(v["runs"][0]["author_name"], "alice");
        assert_eq!(v["runs"][0]["line_count"], 5);
    }
}
