//! `repos` producer (§4.H.1 "repolist"): ACL-filtered listing of every
//! repository visible to the requesting identity.

use serde::Serialize;
use serde_json::Value;

use crate::acl::AclResolver;
use crate::errors::GitJsonError;
use crate::repodir::Rei;

#[derive(Debug, Serialize)]
struct RepoEntryJson {
    name: String,
    description: Option<String>,
    owner: Option<String>,
    url: Option<String>,
}

impl From<&Rei> for RepoEntryJson {
    fn from(rei: &Rei) -> Self {
        Self {
            name: rei.name.clone(),
            description: rei.description.clone(),
            owner: rei.owner.clone(),
            url: rei.url.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct RepoListArtifact {
    schema: &'static str,
    job: &'static str,
    repos: Vec<RepoEntryJson>,
}

/// Builds the `repos` JSON body, filtering `reis` down to those `user` is
/// authorized to read (§4.E applied per-repo rather than per-vhost here).
pub fn build(resolver: Option<&AclResolver>, reis: &[std::sync::Arc<Rei>], user: Option<&str>) -> Result<Value, GitJsonError> {
    let mut visible: Vec<RepoEntryJson> = Vec::with_capacity(reis.len());
    for rei in reis {
        let allowed = match resolver {
            Some(r) => r.acl_check(&rei.name, user)?,
            None => true,
        };
        if allowed {
            visible.push(RepoEntryJson::from(rei.as_ref()));
        }
    }
    visible.sort_by(|a, b| a.name.cmp(&b.name));

    let artifact = RepoListArtifact {
        schema: "libjg2-1",
        job: "repos",
        repos: visible,
    };
    Ok(serde_json::to_value(&artifact).unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rei(name: &str) -> std::sync::Arc<Rei> {
        std::sync::Arc::new(Rei::new(name.to_string()))
    }

    #[test]
    fn no_resolver_shows_every_repo_sorted() {
        let reis = vec![rei("z.git"), rei("a.git")];
        let v = build(None, &reis, None).unwrap();
        let names: Vec<&str> = v["repos"].as_array().unwrap().iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["a.git", "z.git"]);
    }
}
