//! Ref list + fingerprint tracker (§4.D).
//!
//! Keeps one name-sorted list of refs and one table bucketed by the first
//! byte of the ref's oid (§3 "Ref": "two intrusive lists: name-order and
//! hashed-by-first-bucket-of-oid"). Rust has no intrusive lists worth
//! fighting the borrow checker for here, so the bucket table is expressed
//! as a plain index built from the name-ordered `Vec` (§9 "Cycles and
//! back-references": owner + non-owning handles, explicit arrays instead
//! of intrusive pointers).

use crate::git_reader::RawRef;
use crate::hash::{Fingerprint, Md5Impl, Oid};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ref {
    pub name: String,
    pub oid: Oid,
}

/// Maintains the sorted ref list and recomputed fingerprint (§4.D).
pub struct RefTracker {
    refs: Vec<Ref>,
    fingerprint: Fingerprint,
    md5: Md5Impl,
}

impl RefTracker {
    pub fn new() -> Self {
        Self {
            refs: Vec::new(),
            fingerprint: Fingerprint::default(),
            md5: Md5Impl::default(),
        }
    }

    pub fn with_md5(md5: Md5Impl) -> Self {
        Self {
            refs: Vec::new(),
            fingerprint: Fingerprint::default(),
            md5,
        }
    }

    /// Full (re)build, used at `Repo::open` time and whenever the cheap
    /// incremental path in `update` can't be used (step 3, §4.D).
    pub fn rebuild(&mut self, mut raw: Vec<RawRef>) {
        raw.sort_by(|a, b| a.name.cmp(&b.name));
        self.refs = raw
            .into_iter()
            .map(|r| Ref {
                name: r.name,
                oid: r.oid,
            })
            .collect();
        self.recompute_fingerprint();
    }

    /// Applies a fresh ref listing, following the §4.D steps:
    /// 1. compare names in parallel with the existing sorted list;
    /// 2. if names still agree but oids changed, update in place;
    /// 3. if a name disagrees or counts differ, rebuild from the point of
    ///    divergence onward;
    /// 4. recompute the fingerprint;
    /// returns whether the fingerprint changed (step 5's trigger for the
    /// refchange callback, applied by the caller).
    pub fn update(&mut self, mut raw: Vec<RawRef>) -> bool {
        raw.sort_by(|a, b| a.name.cmp(&b.name));

        let mut divergence = None;
        for (i, new_ref) in raw.iter().enumerate() {
            match self.refs.get(i) {
                Some(existing) if existing.name == new_ref.name => {
                    if existing.oid != new_ref.oid {
                        self.refs[i].oid = new_ref.oid.clone();
                    }
                }
                _ => {
                    divergence = Some(i);
                    break;
                }
            }
        }

        if raw.len() != self.refs.len() {
            divergence = divergence.or(Some(raw.len().min(self.refs.len())));
        }

        if let Some(at) = divergence {
            self.refs.truncate(at);
            self.refs.extend(raw.into_iter().skip(at).map(|r| Ref {
                name: r.name,
                oid: r.oid,
            }));
        }

        let old_fp = self.fingerprint;
        self.recompute_fingerprint();
        old_fp != self.fingerprint
    }

    /// Step 4: `MD5(concat over refs in name order of (ref_name ||
    /// oid_bytes))` (spec §3 invariant 3).
    fn recompute_fingerprint(&mut self) {
        let mut ctx = self.md5.context();
        ctx.init();
        for r in &self.refs {
            ctx.update(r.name.as_bytes());
            ctx.update(&r.oid.raw_bytes());
        }
        self.fingerprint = Fingerprint::from_bytes(ctx.finalize());
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn refs_by_name(&self) -> &[Ref] {
        &self.refs
    }

    pub fn refs_by_oid_bucket(&self, bucket: u8) -> Vec<Ref> {
        self.refs
            .iter()
            .filter(|r| r.oid.bucket() == bucket)
            .cloned()
            .collect()
    }

    pub fn resolve(&self, name_or_oid: &str) -> Option<Oid> {
        if let Some(r) = self.refs.iter().find(|r| r.name == name_or_oid) {
            return Some(r.oid.clone());
        }
        self.refs
            .iter()
            .find(|r| r.oid.as_str() == name_or_oid)
            .map(|r| r.oid.clone())
    }
}

impl Default for RefTracker {
    fn default() -> Self {
        Self::new()
    }
}
