//! Repository state tracker and open-repo handle (§3 "Repo"/"Ref", §4.D).

pub mod state;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::git_reader::GitReader;
use crate::hash::{Fingerprint, Oid};

pub use state::{Ref, RefTracker};

/// One open (vhost, repository) handle (§3 "Repo").
pub struct Repo {
    pub repo_path: PathBuf,
    pub git_reader: Arc<dyn GitReader>,
    inner: Mutex<RepoInner>,
}

struct RepoInner {
    tracker: RefTracker,
    last_update: std::time::Instant,
    ctxs_using: usize,
}

impl Repo {
    pub fn open(repo_path: PathBuf, git_reader: Arc<dyn GitReader>) -> Result<Self, crate::errors::GitJsonError> {
        let refs = git_reader.list_refs()?;
        let mut tracker = RefTracker::new();
        tracker.rebuild(refs);
        Ok(Self {
            repo_path,
            git_reader,
            inner: Mutex::new(RepoInner {
                tracker,
                last_update: std::time::Instant::now(),
                ctxs_using: 0,
            }),
        })
    }

    /// Rate-limited ref refresh (§4.D: "at most one check per 3 seconds
    /// per repo"). Returns `true` if the fingerprint changed.
    pub fn maybe_refresh(&self) -> Result<bool, crate::errors::GitJsonError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.last_update.elapsed() < std::time::Duration::from_secs(3) {
            return Ok(false);
        }
        let refs = self.git_reader.list_refs()?;
        let changed = inner.tracker.update(refs);
        inner.last_update = std::time::Instant::now();
        Ok(changed)
    }

    pub fn ref_fingerprint(&self) -> Fingerprint {
        self.inner.lock().unwrap().tracker.fingerprint()
    }

    pub fn refs_by_name(&self) -> Vec<Ref> {
        self.inner.lock().unwrap().tracker.refs_by_name().to_vec()
    }

    /// Refs whose oid's first byte matches `bucket` (§3 "Ref": "hashed by
    /// first byte of oid" for O(1) decoration lookup).
    pub fn refs_by_oid_bucket(&self, bucket: u8) -> Vec<Ref> {
        self.inner
            .lock()
            .unwrap()
            .tracker
            .refs_by_oid_bucket(bucket)
            .to_vec()
    }

    pub fn resolve_oid(&self, name_or_oid: &str) -> Option<Oid> {
        self.inner.lock().unwrap().tracker.resolve(name_or_oid)
    }

    pub fn mark_context_attached(&self) {
        self.inner.lock().unwrap().ctxs_using += 1;
    }

    pub fn mark_context_detached(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.ctxs_using = inner.ctxs_using.saturating_sub(1);
    }

    pub fn contexts_using(&self) -> usize {
        self.inner.lock().unwrap().ctxs_using
    }
}

/// Registry of open `Repo` handles for one vhost (§3 "Vhost": "the list of
/// open repos"), keyed by repository name.
#[derive(Default)]
pub struct RepoRegistry {
    repos: HashMap<String, Arc<Repo>>,
}

impl RepoRegistry {
    pub fn get(&self, name: &str) -> Option<Arc<Repo>> {
        self.repos.get(name).cloned()
    }

    pub fn insert(&mut self, name: String, repo: Arc<Repo>) {
        self.repos.insert(name, repo);
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }
}
