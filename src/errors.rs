//! Error types for the gitjson-core crate.
//!
//! This module defines a unified error enumeration used across the disk
//! cache, the ACL resolver, the job engine, and the repository state
//! tracker. It integrates with `thiserror` to provide rich `Display`
//! implementations and error source chaining where applicable.
//!
//! Notes:
//! - Each variant carries contextual details via its message payload.
//! - `GitJsonError` never crosses the stable library boundary (§6) directly;
//!   `context_create`/`context_fill` narrow it down to the small set of
//!   stable status codes, and job producers fold it into an `"error"` JSON
//!   field instead of propagating it to the host.

use thiserror::Error;

#[derive(Error, Debug)]
/// Unified error enumeration for gitjson-core.
pub enum GitJsonError {
    /// Vhost configuration is missing a mandatory field or points at a path
    /// that doesn't exist.
    #[error("invalid vhost config: {0}")]
    InvalidConfig(String),

    /// The requested repository could not be opened (missing, not a bare
    /// repo, permission denied).
    #[error("failed to open repository `{0}`")]
    RepoOpenFailed(String),

    /// `acl_check` denied access to the repository for the given identity.
    #[error("access denied to `{0}` for `{1}`")]
    AclDenied(String, String),

    /// The gitolite helper replied with something that wasn't a valid v3
    /// reply, or the probe detected v2 semantics.
    #[error("gitolite helper error: {0}")]
    HelperError(String),

    /// The running gitolite is v2, which this library does not support.
    #[error("gitolite v2 detected; v3 is required")]
    HelperVersionTooOld,

    /// A backing-store read failed (missing object, corrupt ref, I/O error
    /// surfaced by the git reader capability).
    #[error("backing store error: {0}")]
    BackingStore(String),

    /// Disk cache I/O failed; the caller should degrade to uncached
    /// operation rather than treat this as fatal.
    #[error("cache error: {0}")]
    Cache(String),

    /// Allocation failure in the per-context arena.
    #[error("out of memory")]
    Oom,

    /// Malformed request path (§4.I resolver).
    #[error("invalid request path: {0}")]
    InvalidPath(String),

    /// Archive (tar/zip) construction failed.
    #[error("archive error: {0}")]
    Archive(String),

    /// Search index build or query failed.
    #[error("search index error: {0}")]
    SearchIndex(String),

    /// I/O error from the underlying filesystem.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic custom error for miscellaneous failures.
    #[error("{0}")]
    Custom(String),
}

impl GitJsonError {
    /// Purified, single-line message suitable for embedding in a JSON
    /// `"error"` field (see `purify::purify_str`).
    pub fn purified_message(&self) -> String {
        crate::purify::purify_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_single_line() {
        let e = GitJsonError::RepoOpenFailed("a.git".into());
        assert!(!e.to_string().contains('\n'));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
        let e: GitJsonError = io_err.into();
        assert!(matches!(e, GitJsonError::Io(_)));
    }
}
