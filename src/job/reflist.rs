//! `tags` / `branches` producers (§4.H.1): flat listing of one ref
//! namespace, newest-pointed-at-commit-time first is left to the host's
//! git reader ordering; this module only filters and shapes the JSON.

use serde::Serialize;
use serde_json::Value;

use crate::repo::Ref;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefNamespace {
    Heads,
    Tags,
}

impl RefNamespace {
    fn prefix(&self) -> &'static str {
        match self {
            RefNamespace::Heads => "refs/heads/",
            RefNamespace::Tags => "refs/tags/",
        }
    }
}

#[derive(Debug, Serialize)]
struct RefEntry {
    name: String,
    oid: String,
}

#[derive(Debug, Serialize)]
struct RefListArtifact {
    schema: &'static str,
    job: &'static str,
    refs: Vec<RefEntry>,
}

/// Builds the `tags`/`branches` envelope item.
pub fn build(refs: &[Ref], namespace: RefNamespace) -> Value {
    let prefix = namespace.prefix();
    let entries: Vec<RefEntry> = refs
        .iter()
        .filter(|r| r.name.starts_with(prefix))
        .map(|r| RefEntry {
            name: r.name[prefix.len()..].to_string(),
            oid: r.oid.as_str().to_string(),
        })
        .collect();

    let artifact = RefListArtifact {
        schema: "libjg2-1",
        job: match namespace {
            RefNamespace::Heads => "branches",
            RefNamespace::Tags => "tags",
        },
        refs: entries,
    };
    serde_json::to_value(&artifact).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Oid;

    fn refs() -> Vec<Ref> {
        vec![
            Ref {
                name: "refs/heads/main".into(),
                oid: Oid::from("aa00"),
            },
            Ref {
                name: "refs/tags/v1.0".into(),
                oid: Oid::from("bb00"),
            },
        ]
    }

    #[test]
    fn filters_to_requested_namespace() {
        let v = build(&refs(), RefNamespace::Heads);
        assert_eq!(v["refs"].as_array().unwrap().len(), 1);
        assert_eq!(v["refs"][0]["name"], "main");
    }

    #[test]
    fn tags_namespace_strips_prefix() {
        let v = build(&refs(), RefNamespace::Tags);
        assert_eq!(v["refs"][0]["name"], "v1.0");
    }
}
