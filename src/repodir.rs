//! Repodir: shared state keyed by the on-disk repository base directory
//! (§3 "Repodir", GLOSSARY). One `Repodir` is shared by every `Vhost`
//! pointing at the same `repo_base_dir`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dashmap::DashSet;

use crate::hash::Oid;

/// Immutable-after-creation per-repository record (§3 "Repo entry info").
/// Lives in the repodir's current "generation"; the whole generation is
/// replaced (not mutated) when the gitolite-admin head oid changes,
/// matching the spec's "free the whole arena, force full rescan".
#[derive(Debug, Clone)]
pub struct Rei {
    pub name: String,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub url: Option<String>,
    /// Names of identities known to have `refs/.*` access, populated
    /// lazily by the ACL resolver (§4.E).
    pub valid_acls: Arc<DashSet<String>>,
}

impl Rei {
    pub fn new(name: String) -> Self {
        Self {
            name,
            description: None,
            owner: None,
            url: None,
            valid_acls: Arc::new(DashSet::new()),
        }
    }
}

/// One generation of the repo entry list, replaced wholesale on gitolite
/// admin reload (spec §9 open question 4: "differential reload is out of
/// scope").
struct Generation {
    reis: HashMap<String, Arc<Rei>>,
    gitolite_admin_head: Option<Oid>,
}

/// Shared per-`repo_base_dir` state (§3 "Repodir").
pub struct Repodir {
    pub base_dir: PathBuf,
    generation: Mutex<Generation>,
    last_admin_check: Mutex<std::time::Instant>,
    refcount: std::sync::atomic::AtomicUsize,
    /// Identities for which a batched ACL query has already run against
    /// the current generation (§3 "the set of known authorized
    /// identities").
    pub known_acl_users: Arc<DashSet<String>>,
}

impl Repodir {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            generation: Mutex::new(Generation {
                reis: HashMap::new(),
                gitolite_admin_head: None,
            }),
            last_admin_check: Mutex::new(std::time::Instant::now() - std::time::Duration::from_secs(3600)),
            refcount: std::sync::atomic::AtomicUsize::new(0),
            known_acl_users: Arc::new(DashSet::new()),
        }
    }

    pub fn acquire(&self) {
        self.refcount.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    /// Returns the refcount after release; the owning registry drops the
    /// repodir when this reaches zero (§3 "Lifecycles").
    pub fn release(&self) -> usize {
        self.refcount.fetch_sub(1, std::sync::atomic::Ordering::SeqCst) - 1
    }

    /// Rescans `base_dir` for bare repositories (`*.git` directories),
    /// replacing the current generation wholesale (§4.E step (a)).
    /// Rate-limited to once per second by the caller (ACL resolver) via
    /// `admin_check_due`.
    pub fn rescan(&self, admin_head: Option<Oid>) -> std::io::Result<()> {
        let mut reis = HashMap::new();
        if let Ok(entries) = std::fs::read_dir(&self.base_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if !name.ends_with(".git") {
                    continue;
                }
                let rei = Rei::new(name.to_string());
                reis.insert(name.to_string(), Arc::new(rei));
            }
        }
        let mut gen = self.generation.lock().unwrap();
        let admin_head_changed = gen.gitolite_admin_head != admin_head;
        gen.reis = reis;
        gen.gitolite_admin_head = admin_head;
        drop(gen);
        if admin_head_changed {
            // §9 open question 4: the whole rei generation and every
            // cached ACL resolution are dropped and rebuilt from scratch.
            self.known_acl_users.clear();
        }
        Ok(())
    }

    pub fn get_rei(&self, name: &str) -> Option<Arc<Rei>> {
        self.generation.lock().unwrap().reis.get(name).cloned()
    }

    pub fn all_reis(&self) -> Vec<Arc<Rei>> {
        self.generation.lock().unwrap().reis.values().cloned().collect()
    }

    pub fn gitolite_admin_head(&self) -> Option<Oid> {
        self.generation.lock().unwrap().gitolite_admin_head.clone()
    }

    /// Rate limiter for the admin-head freshness check (§4.E: "rate-limited
    /// to once per second").
    pub fn admin_check_due(&self) -> bool {
        let mut last = self.last_admin_check.lock().unwrap();
        if last.elapsed() >= std::time::Duration::from_secs(1) {
            *last = std::time::Instant::now();
            true
        } else {
            false
        }
    }
}

/// Process-wide registry of `Repodir`s keyed by canonical base path, so
/// two vhosts pointing at the same directory share one instance (§3).
#[derive(Default)]
pub struct RepodirRegistry {
    dirs: Mutex<HashMap<PathBuf, Arc<Repodir>>>,
}

impl RepodirRegistry {
    pub fn acquire(&self, base_dir: &Path) -> Arc<Repodir> {
        let mut dirs = self.dirs.lock().unwrap();
        let repodir = dirs
            .entry(base_dir.to_path_buf())
            .or_insert_with(|| Arc::new(Repodir::new(base_dir.to_path_buf())))
            .clone();
        repodir.acquire();
        repodir
    }

    pub fn release(&self, base_dir: &Path) {
        let mut dirs = self.dirs.lock().unwrap();
        if let Some(repodir) = dirs.get(base_dir) {
            if repodir.release() == 0 {
                dirs.remove(base_dir);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.dirs.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rescan_finds_bare_repo_dirs() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("a.git")).unwrap();
        std::fs::create_dir(dir.path().join("not-a-repo")).unwrap();

        let repodir = Repodir::new(dir.path().to_path_buf());
        repodir.rescan(None).unwrap();
        assert!(repodir.get_rei("a.git").is_some());
        assert!(repodir.get_rei("not-a-repo").is_none());
    }

    #[test]
    fn registry_shares_instance_for_same_path() {
        let dir = tempdir().unwrap();
        let registry = RepodirRegistry::default();
        let a = registry.acquire(dir.path());
        let b = registry.acquire(dir.path());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registry_drops_entry_when_refcount_reaches_zero() {
        let dir = tempdir().unwrap();
        let registry = RepodirRegistry::default();
        let _a = registry.acquire(dir.path());
        registry.release(dir.path());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn admin_check_due_is_rate_limited() {
        let dir = tempdir().unwrap();
        let repodir = Repodir::new(dir.path().to_path_buf());
        assert!(repodir.admin_check_due());
        assert!(!repodir.admin_check_due());
    }
}
