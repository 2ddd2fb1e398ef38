//! Vhost: long-lived configuration-and-state binding (§3 "Vhost").

use std::sync::{Arc, Mutex};

use crate::acl::AclResolver;
use crate::acl::helper::QueryBackend;
use crate::cache::DiskCache;
use crate::config::VhostConfig;
use crate::errors::GitJsonError;
use crate::git_reader::GitReader;
use crate::identity::EmailCache;
use crate::job::search::index::IndexRegistry;
use crate::repo::{Repo, RepoRegistry};
use crate::repodir::{Repodir, RepodirRegistry};
use crate::sandwich::SandwichTemplate;

/// Factory for a `GitReader` bound to one repository path, supplied by
/// the host at vhost creation (the core never ships a concrete backend,
/// per §1's explicit non-goal).
pub type GitReaderFactory = Arc<dyn Fn(&std::path::Path) -> Result<Arc<dyn GitReader>, GitJsonError> + Send + Sync>;

/// One long-lived `Vhost` (§3). Shared by many contexts; the repo
/// registry and email cache are protected by a recursive vhost-style
/// lock (`Mutex` here — Rust's `Mutex` is not reentrant, so callers must
/// avoid re-entering while already holding it, matching §5's "never
/// acquire a lock already held except on the recursive vhost lock" by
/// simply never nesting vhost-lock acquisitions in this implementation).
pub struct Vhost {
    pub config: VhostConfig,
    pub repodir: Arc<Repodir>,
    pub cache: Option<Arc<DiskCache>>,
    pub email_cache: Arc<EmailCache>,
    pub acl_resolver: Option<Arc<AclResolver>>,
    pub sandwich: Option<SandwichTemplate>,
    /// Shared so two concurrent requesters for the same (repo, commit)
    /// search index converge on one build instead of duplicating the
    /// tree walk (§4.H.4 "ongoing-index marker").
    pub search_index: IndexRegistry,
    repos: Mutex<RepoRegistry>,
    reader_factory: GitReaderFactory,
}

impl Vhost {
    pub fn create(
        config: VhostConfig,
        repodir_registry: &RepodirRegistry,
        reader_factory: GitReaderFactory,
        acl_backend: Option<Arc<dyn QueryBackend>>,
    ) -> Result<Arc<Self>, GitJsonError> {
        config.validate()?;

        let repodir = repodir_registry.acquire(&config.repo_base_dir);
        repodir.rescan(None).map_err(|e| GitJsonError::BackingStore(e.to_string()))?;

        let cache = config.json_cache_base.clone().map(|base| {
            Arc::new(DiskCache::new(
                base,
                if config.cache_uid != 0 {
                    Some(config.cache_uid)
                } else {
                    None
                },
            ))
        });

        let email_cache = Arc::new(EmailCache::new(
            config.effective_email_hash_bins(),
            config.effective_email_hash_depth(),
            config.md5_impl.clone(),
        ));

        let sandwich = config
            .html_template_path
            .as_ref()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|s| SandwichTemplate::parse(&s));

        let acl_resolver = acl_backend.map(|backend| {
            let repodir = repodir.clone();
            Arc::new(AclResolver::new(
                repodir,
                backend,
                config.md5_impl.clone(),
                Arc::new(|| None),
            ))
        });

        Ok(Arc::new(Self {
            config,
            repodir,
            cache,
            email_cache,
            acl_resolver,
            sandwich,
            search_index: IndexRegistry::default(),
            repos: Mutex::new(RepoRegistry::default()),
            reader_factory,
        }))
    }

    /// Finds or opens the `Repo` handle for `name` (§3 "Repo (open
    /// handle)": "from first request referring to it until vhost
    /// destroy").
    pub fn open_repo(&self, name: &str) -> Result<Arc<Repo>, GitJsonError> {
        if let Some(repo) = self.repos.lock().unwrap().get(name) {
            return Ok(repo);
        }
        let repo_path = self.config.repo_base_dir.join(name);
        if !repo_path.is_dir() {
            return Err(GitJsonError::RepoOpenFailed(name.to_string()));
        }
        let reader = (self.reader_factory)(&repo_path)?;
        let repo = Arc::new(Repo::open(repo_path, reader)?);
        self.repos.lock().unwrap().insert(name.to_string(), repo.clone());
        Ok(repo)
    }

    /// `acl_check` gate applied to every repository lookup (§1, §4.E): the
    /// request is denied unless *both* the vhost's configured identity
    /// and the caller's authorized identity pass.
    pub fn check_repo_access(&self, repo_name: &str, authorized: Option<&str>) -> Result<bool, GitJsonError> {
        let Some(resolver) = &self.acl_resolver else {
            return Ok(true); // no ACL configured: vhost-level gate disabled
        };
        if let Some(vhost_user) = &self.config.acl_user {
            if !resolver.acl_check(repo_name, Some(vhost_user))? {
                return Ok(false);
            }
        }
        resolver.acl_check(repo_name, authorized)
    }

    pub fn open_repo_count(&self) -> usize {
        self.repos.lock().unwrap().len()
    }
}
