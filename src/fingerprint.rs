//! Fingerprint composer (§4.G).
//!
//! Combines every input that can affect a cacheable artifact's bytes into
//! one MD5, in a fixed field order, so that changing any of them changes
//! the cache key. Used both as the disk-cache key and as the `ETag`.

use crate::hash::{Fingerprint, Md5Impl, Oid};

/// The epoch constant bumped to invalidate every cached JSON artifact at
/// once (§4.G item 1) — analogous to a schema version.
pub const FINGERPRINT_EPOCH: u8 = 1;

/// Per-repo metadata that participates in list-view fingerprints (§4.G
/// item 9: "every non-empty (description, owner, url) of every repository
/// except the currently-named one").
#[derive(Debug, Clone, Default)]
pub struct RepoMetadata {
    pub name: String,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub url: Option<String>,
}

/// All inputs to one fingerprint computation (§4.G).
pub struct FingerprintInput<'a> {
    pub job_kind: u8,
    /// Paging count; skipped entirely for the search-trie key.
    pub count: Option<u32>,
    pub search_term: Option<&'a str>,
    /// Repo ref fingerprint, if a repo is bound to this request.
    pub repo_ref_fingerprint: Option<Fingerprint>,
    pub repo_path: Option<&'a str>,
    pub mode: &'a str,
    pub sub_path: &'a str,
    /// Oid-in-view; ref-list/repo-list ignore it, blame substitutes the
    /// blob oid (callers are responsible for that substitution).
    pub oid_in_view: Option<&'a Oid>,
    /// Every *other* repository's metadata (item 9). Empty when not
    /// applicable (the caller excludes the currently-named repo already).
    pub other_repo_metadata: &'a [RepoMetadata],
    /// When no repo is bound: the gitolite-admin head oid and the visible
    /// repo names (§4.G item 10).
    pub unbound_list_context: Option<UnboundListContext<'a>>,
}

pub struct UnboundListContext<'a> {
    pub gitolite_admin_head: Option<&'a Oid>,
    pub visible_repo_names: &'a [String],
}

/// Computes the fingerprint for one request, per §4.G's fixed field order.
pub fn compose(md5: &Md5Impl, input: &FingerprintInput<'_>) -> Fingerprint {
    let mut ctx = md5.context();
    ctx.init();

    // 1. job_kind | (epoch << 8)
    let packed: u16 = input.job_kind as u16 | ((FINGERPRINT_EPOCH as u16) << 8);
    ctx.update(&packed.to_le_bytes());

    // 2. paging count (skipped for search-trie, signaled by None)
    if let Some(count) = input.count {
        ctx.update(&count.to_le_bytes());
    }

    // 3. optional search term
    if let Some(term) = input.search_term {
        ctx.update(term.as_bytes());
    }

    // 4. repo ref fingerprint
    if let Some(fp) = input.repo_ref_fingerprint {
        ctx.update(&fp.0);
    }

    // 5. repo path
    if let Some(path) = input.repo_path {
        ctx.update(path.as_bytes());
    }

    // 6. mode
    ctx.update(input.mode.as_bytes());

    // 7. sub-path
    ctx.update(input.sub_path.as_bytes());

    // 8. oid-in-view
    if let Some(oid) = input.oid_in_view {
        ctx.update(oid.as_str().as_bytes());
    }

    // 9. other repos' metadata
    for meta in input.other_repo_metadata {
        if let Some(d) = &meta.description {
            if !d.is_empty() {
                ctx.update(d.as_bytes());
            }
        }
        if let Some(o) = &meta.owner {
            if !o.is_empty() {
                ctx.update(o.as_bytes());
            }
        }
        if let Some(u) = &meta.url {
            if !u.is_empty() {
                ctx.update(u.as_bytes());
            }
        }
    }

    // 10. when no repo is bound: gitolite-admin head oid + visible repo names
    if let Some(ctx_info) = &input.unbound_list_context {
        if let Some(head) = ctx_info.gitolite_admin_head {
            ctx.update(head.as_str().as_bytes());
        }
        for name in ctx_info.visible_repo_names {
            ctx.update(name.as_bytes());
        }
    }

    Fingerprint::from_bytes(ctx.finalize())
}
