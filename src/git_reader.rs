//! The "git reader" capability (§1, §6): gitjson-core never depends on a
//! specific git-reading implementation. Everything the job engine needs
//! from an on-disk bare repository is expressed as this trait; a host
//! supplies a concrete implementation (gitoxide, libgit2-backed, or a test
//! double) at `Repo::open` time.
//!
//! This mirrors the teacher crate's `protocol::core::RepositoryAccess`
//! trait-at-the-seams pattern, adapted from an async network-protocol
//! trait to a synchronous local-repository trait (the job engine is
//! deliberately synchronous, per §5's OS-thread model).

use crate::hash::Oid;

/// One entry of a tree listing (§4.H.1 "tree").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    /// POSIX mode bits, e.g. 0o100644, 0o100755, 0o040000, 0o120000.
    pub mode: u32,
    pub oid: Oid,
    pub size: Option<u64>,
}

impl TreeEntry {
    pub fn is_dir(&self) -> bool {
        self.mode & 0o170000 == 0o040000
    }
}

/// A commit's header fields, independent of body text (§4.H.1 "commit").
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub oid: Oid,
    pub tree: Oid,
    pub parents: Vec<Oid>,
    pub author_name: String,
    pub author_email: String,
    pub author_time: i64,
    pub committer_name: String,
    pub committer_email: String,
    pub committer_time: i64,
    /// Subject line.
    pub summary: String,
    /// Body paragraphs after the subject (§4.H.1 "commit").
    pub body: String,
}

/// One line of blame output (§4.H.3).
#[derive(Debug, Clone)]
pub struct BlameHunk {
    pub orig_commit: Oid,
    pub final_commit: Oid,
    pub orig_start: u32,
    pub final_start: u32,
    pub lines: u32,
}

/// A resolved ref (§3 "Ref").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRef {
    pub name: String,
    pub oid: Oid,
}

/// Everything the job engine needs to read from one bare repository.
/// Implementations must be safe to share across threads (an open `Repo`
/// handle may serve several contexts concurrently, each read-only).
pub trait GitReader: Send + Sync {
    /// Lists every `refs/heads/*` and `refs/tags/*` ref, in the backend's
    /// natural order (the repository-state tracker sorts by name itself).
    fn list_refs(&self) -> Result<Vec<RawRef>, crate::errors::GitJsonError>;

    /// Resolves a ref name or hex oid to a commit oid. Accepts `"HEAD"`,
    /// `"refs/heads/<branch>"`, or a (possibly abbreviated) hex oid.
    fn resolve(&self, spec: &str) -> Result<Oid, crate::errors::GitJsonError>;

    fn read_commit(&self, oid: &Oid) -> Result<CommitInfo, crate::errors::GitJsonError>;

    /// First-parent walk starting at `oid`, at most `count` entries.
    fn walk_first_parent(
        &self,
        oid: &Oid,
        count: usize,
    ) -> Result<Vec<CommitInfo>, crate::errors::GitJsonError>;

    /// Lists the immediate entries of the tree at `tree_oid`.
    fn read_tree(&self, tree_oid: &Oid) -> Result<Vec<TreeEntry>, crate::errors::GitJsonError>;

    /// Resolves `sub_path` starting from `commit_oid`'s tree, returning
    /// either a tree or a blob entry plus its containing tree oid.
    fn resolve_path(
        &self,
        commit_oid: &Oid,
        sub_path: &str,
    ) -> Result<PathResolution, crate::errors::GitJsonError>;

    fn read_blob(&self, oid: &Oid) -> Result<Vec<u8>, crate::errors::GitJsonError>;

    /// Per-line blame for `path` as of `commit_oid` (§4.H.3).
    fn blame(
        &self,
        commit_oid: &Oid,
        path: &str,
    ) -> Result<Vec<BlameHunk>, crate::errors::GitJsonError>;
}

#[derive(Debug, Clone)]
pub enum PathResolution {
    Tree { oid: Oid, entries: Vec<TreeEntry> },
    Blob { oid: Oid, mode: u32, size: u64 },
    NotFound,
}

/// Heuristic binary detection shared by the `tree`/`plain` producers: a
/// NUL byte in the first 8000 bytes, the same sniff window git itself
/// uses for `core.autocrlf`/diff binary detection.
pub fn looks_binary(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(8000)];
    window.contains(&0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_entry_is_dir_detects_040000() {
        let entry = TreeEntry {
            name: "src".into(),
            mode: 0o040000,
            oid: Oid::from("0".repeat(40)),
            size: None,
        };
        assert!(entry.is_dir());
    }

    #[test]
    fn tree_entry_regular_file_is_not_dir() {
        let entry = TreeEntry {
            name: "main.rs".into(),
            mode: 0o100644,
            oid: Oid::from("0".repeat(40)),
            size: Some(10),
        };
        assert!(!entry.is_dir());
    }

    #[test]
    fn looks_binary_detects_nul() {
        assert!(looks_binary(b"hello\0world"));
        assert!(!looks_binary(b"hello world"));
    }
}
