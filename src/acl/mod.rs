//! ACL resolver (§4.E): "may user U read repo R?" in O(1) after a
//! per-(repodir, U) batch query against the gitolite helper.

pub mod helper;

use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::GitJsonError;
use crate::hash::{Md5Impl, Oid};
use crate::repodir::Repodir;
use helper::QueryBackend;

/// Pseudo-identity that always passes ACL checks (§4.E: "`@all` as a user
/// name short-circuits to allow").
pub const ALL_USERS: &str = "@all";

pub struct AclResolver {
    repodir: Arc<Repodir>,
    backend: Arc<dyn QueryBackend>,
    md5: Md5Impl,
    /// Where the admin repository's current HEAD oid is read from; kept
    /// as a closure so the resolver doesn't need a concrete git backend
    /// dependency (mirrors the `git_reader` pluggability elsewhere).
    admin_head: Arc<dyn Fn() -> Option<Oid> + Send + Sync>,
}

impl AclResolver {
    pub fn new(
        repodir: Arc<Repodir>,
        backend: Arc<dyn QueryBackend>,
        md5: Md5Impl,
        admin_head: Arc<dyn Fn() -> Option<Oid> + Send + Sync>,
    ) -> Self {
        Self {
            repodir,
            backend,
            md5,
            admin_head,
        }
    }

    /// `acl_check(repo_name, auth_name)` (§4.E contract).
    pub fn acl_check(&self, repo_name: &str, auth_name: Option<&str>) -> Result<bool, GitJsonError> {
        let Some(user) = auth_name else {
            return Ok(false); // null user = deny
        };
        if user == ALL_USERS {
            return Ok(true);
        }

        self.ensure_repodir_fresh()?;

        if !self.repodir.known_acl_users.contains(user) {
            self.run_batched_query(user)?;
        }

        Ok(self
            .repodir
            .get_rei(repo_name)
            .map(|rei| rei.valid_acls.contains(user))
            .unwrap_or(false))
    }

    /// §4.E step (a): "ensure the repodir's repo list is fresh — recompute
    /// if the gitolite-admin repository's master head oid has changed
    /// since last check (rate-limited to once per second)".
    fn ensure_repodir_fresh(&self) -> Result<(), GitJsonError> {
        if !self.repodir.admin_check_due() {
            return Ok(());
        }
        let head = (self.admin_head)();
        if head != self.repodir.gitolite_admin_head() {
            self.repodir
                .rescan(head)
                .map_err(|e| GitJsonError::BackingStore(e.to_string()))?;
        }
        Ok(())
    }

    /// §4.E step (b): batched query "for user U, which repos in this list
    /// have `refs/.*` access?" — one reply line per repo, format
    /// `<reponame>\t<perm>` matching gitolite's own `access -q` output.
    fn run_batched_query(&self, user: &str) -> Result<(), GitJsonError> {
        let reis = self.repodir.all_reis();
        let repo_names: Vec<String> = reis.iter().map(|r| r.name.clone()).collect();
        if repo_names.is_empty() {
            self.repodir.known_acl_users.insert(user.to_string());
            return Ok(());
        }

        let tmp = std::env::temp_dir();
        let stdin_path = tmp.join(format!("_gl3_in_{}_{}", std::process::id(), user));
        let stdout_path = tmp.join(format!("_gl3_out_{}_{}", std::process::id(), user));
        std::fs::write(&stdin_path, repo_names.join("\n")).map_err(|e| GitJsonError::HelperError(e.to_string()))?;

        let args_line = format!("gitolite access -q {user} refs/.*");
        let rc = self.backend.query(&args_line, &stdin_path, &stdout_path)?;
        let _ = std::fs::remove_file(&stdin_path);

        let output = std::fs::read_to_string(&stdout_path).unwrap_or_default();
        let _ = std::fs::remove_file(&stdout_path);

        if rc != 0 {
            return Err(GitJsonError::HelperError(format!("helper returned {rc}")));
        }

        for line in output.lines() {
            let repo_name = line.split('\t').next().unwrap_or("").trim();
            if repo_name.is_empty() {
                continue;
            }
            if let Some(rei) = self.repodir.get_rei(repo_name) {
                rei.valid_acls.insert(user.to_string());
            }
        }

        self.repodir.known_acl_users.insert(user.to_string());
        self.cache_result(user, &output);
        Ok(())
    }

    /// §4.E "Cache: every ACL resolution result ... is written to the disk
    /// cache, keyed by gitolite-admin head oid".
    fn cache_result(&self, user: &str, raw_reply: &str) {
        let Some(head) = self.repodir.gitolite_admin_head() else {
            return;
        };
        let mut ctx = self.md5.context();
        ctx.init();
        ctx.update(head.as_str().as_bytes());
        ctx.update(user.as_bytes());
        let fp = crate::hash::Fingerprint::from_bytes(ctx.finalize());

        let cache_dir = self.repodir.base_dir.join(".gitjson-acl-cache");
        if std::fs::create_dir_all(&cache_dir).is_err() {
            return;
        }
        let path: PathBuf = cache_dir.join(fp.hex());
        let _ = std::fs::write(path, raw_reply);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::helper::FakeQueryBackend;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Arc<Repodir>) {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("a.git")).unwrap();
        std::fs::create_dir(dir.path().join("s.git")).unwrap();
        let repodir = Arc::new(Repodir::new(dir.path().to_path_buf()));
        repodir.rescan(Some(Oid::from("head1".to_string()))).unwrap();
        (dir, repodir)
    }

    #[test]
    fn null_user_is_denied() {
        let (_dir, repodir) = setup();
        let backend = Arc::new(FakeQueryBackend::new(true));
        let resolver = AclResolver::new(
            repodir,
            backend,
            Md5Impl::default(),
            Arc::new(|| Some(Oid::from("head1".to_string()))),
        );
        assert!(!resolver.acl_check("a.git", None).unwrap());
    }

    #[test]
    fn all_users_short_circuits_to_allow() {
        let (_dir, repodir) = setup();
        let backend = Arc::new(FakeQueryBackend::new(true));
        let resolver = AclResolver::new(
            repodir,
            backend,
            Md5Impl::default(),
            Arc::new(|| Some(Oid::from("head1".to_string()))),
        );
        assert!(resolver.acl_check("s.git", Some(ALL_USERS)).unwrap());
    }

    #[test]
    fn batched_query_grants_named_repo_only() {
        let (_dir, repodir) = setup();
        let backend = Arc::new(FakeQueryBackend::new(true));
        backend.set_response("gitolite access -q alice refs/.*", "a.git\tR\n");
        let resolver = AclResolver::new(
            repodir,
            backend,
            Md5Impl::default(),
            Arc::new(|| Some(Oid::from("head1".to_string()))),
        );
        assert!(resolver.acl_check("a.git", Some("alice")).unwrap());
        assert!(!resolver.acl_check("s.git", Some("alice")).unwrap());
    }

    #[test]
    fn second_check_for_same_user_reuses_known_acls() {
        let (_dir, repodir) = setup();
        let backend = Arc::new(FakeQueryBackend::new(true));
        backend.set_response("gitolite access -q bob refs/.*", "a.git\tR\n");
        let resolver = AclResolver::new(
            repodir.clone(),
            backend.clone(),
            Md5Impl::default(),
            Arc::new(|| Some(Oid::from("head1".to_string()))),
        );
        resolver.acl_check("a.git", Some("bob")).unwrap();
        assert!(repodir.known_acl_users.contains("bob"));
        // Clearing the fake's response proves the second call doesn't re-query.
        backend.set_response("gitolite access -q bob refs/.*", "");
        assert!(resolver.acl_check("a.git", Some("bob")).unwrap());
    }
}
