//! `blog` producer (SPEC_FULL.md supplemented feature / GLOSSARY "Blog
//! mode"): renders a repository's first-parent commit log as a feed of
//! posts, one per commit, title = summary line, body = commit body text.

use serde::Serialize;
use serde_json::Value;

use crate::errors::GitJsonError;
use crate::git_reader::{CommitInfo, GitReader};
use crate::hash::Oid;

#[derive(Debug, Serialize)]
struct PostJson {
    oid: String,
    title: String,
    body: String,
    author_name: String,
    author_time: i64,
}

impl From<&CommitInfo> for PostJson {
    fn from(c: &CommitInfo) -> Self {
        Self {
            oid: c.oid.as_str().to_string(),
            title: c.summary.clone(),
            body: c.body.clone(),
            author_name: c.author_name.clone(),
            author_time: c.author_time,
        }
    }
}

#[derive(Debug, Serialize)]
struct BlogArtifact {
    schema: &'static str,
    job: &'static str,
    offset: u64,
    next_offset: Option<u64>,
    posts: Vec<PostJson>,
}

pub const DEFAULT_PAGE_COUNT: u32 = 20;

/// Builds the `blog` JSON body, paging the same way `log` does (§4.H.1).
pub fn build(reader: &dyn GitReader, start_oid: &Oid, offset: u64, count: u32) -> Result<Value, GitJsonError> {
    let count = count.max(1);
    let fetch = offset as usize + count as usize + 1;
    let commits = reader.walk_first_parent(start_oid, fetch)?;

    let page: Vec<&CommitInfo> = commits.iter().skip(offset as usize).take(count as usize).collect();
    let has_more = commits.len() as u64 > offset + count as u64;

    let artifact = BlogArtifact {
        schema: "libjg2-1",
        job: "blog",
        offset,
        next_offset: has_more.then_some(offset + count as u64),
        posts: page.into_iter().map(PostJson::from).collect(),
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
        fn read_commit(&self, _oid: &Oid) -> Result<CommitInfo, GitJsonError> {
            unimplemented!()
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
            summary: format!("post {n}"),
            body: format!("body text {n}"),
        }
    }

    #[test]
    fn posts_carry_title_and_body() {
        let reader = FixtureReader {
            commits: (0..5).map(commit).collect(),
        };
        let v = build(&reader, &commit(0).oid, 0, 2).unwrap();
        assert_eq!(v["posts"][0]["title"], "post 0");
        assert_eq!(v["posts"][0]["body"], "body text 0");
        assert_eq!(v["next_offset"], 2);
    }
}
