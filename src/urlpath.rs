//! Repository/path resolver (§4.I).
//!
//! Parses the stable boundary path shape:
//! `reponame[/mode[/sub/path]][?h=branch&id=oid&s=offset&q=search]`
//! into a structured record, per §9 "URL parsing: rewrite as a structured
//! parser producing a tagged record rather than in-place string surgery".

use crate::errors::GitJsonError;

/// Modes named at the boundary (§6 "Path shape at the boundary").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Log,
    Tree,
    Blame,
    Plain,
    Commit,
    Patch,
    Snapshot,
    Tags,
    Branches,
    Summary,
    Repos,
    Blog,
    Autocomplete,
    FilePath,
    Search,
}

impl Mode {
    fn parse(s: &str) -> Option<Mode> {
        Some(match s {
            "log" => Mode::Log,
            "tree" => Mode::Tree,
            "blame" => Mode::Blame,
            "blob" | "plain" => Mode::Plain,
            "commit" => Mode::Commit,
            "patch" => Mode::Patch,
            "snapshot" => Mode::Snapshot,
            "tags" => Mode::Tags,
            "branches" => Mode::Branches,
            "summary" => Mode::Summary,
            "repos" => Mode::Repos,
            "blog" => Mode::Blog,
            "ac" => Mode::Autocomplete,
            "fp" => Mode::FilePath,
            "search" => Mode::Search,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Log => "log",
            Mode::Tree => "tree",
            Mode::Blame => "blame",
            Mode::Plain => "plain",
            Mode::Commit => "commit",
            Mode::Patch => "patch",
            Mode::Snapshot => "snapshot",
            Mode::Tags => "tags",
            Mode::Branches => "branches",
            Mode::Summary => "summary",
            Mode::Repos => "repos",
            Mode::Blog => "blog",
            Mode::Autocomplete => "ac",
            Mode::FilePath => "fp",
            Mode::Search => "search",
        }
    }
}

/// The "virtual id" to resolve against the repo's refs (§4.I: "oid field
/// if present; else `refs/heads/<branch>`; else `refs/heads/master`, with
/// a fall-back to `refs/heads/main`").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualId {
    Oid(String),
    RefName(String),
}

#[derive(Debug, Clone)]
pub struct ParsedPath {
    pub repo_name: Option<String>,
    pub mode: Option<Mode>,
    pub sub_path: String,
    pub branch: Option<String>,
    pub oid: Option<String>,
    pub offset: Option<u64>,
    pub search: Option<String>,
}

impl ParsedPath {
    /// Resolves the virtual id per §4.I: explicit oid wins, else the
    /// named branch, else a master/main fallback decided by the caller
    /// (which ref actually exists is a repo-state question, so this
    /// layer only decides *candidates* in priority order).
    pub fn virtual_id_candidates(&self) -> Vec<VirtualId> {
        if let Some(oid) = &self.oid {
            return vec![VirtualId::Oid(oid.clone())];
        }
        if let Some(branch) = &self.branch {
            return vec![VirtualId::RefName(format!("refs/heads/{branch}"))];
        }
        vec![
            VirtualId::RefName("refs/heads/master".to_string()),
            VirtualId::RefName("refs/heads/main".to_string()),
        ]
    }
}

/// Parses a boundary path. `blog_mode` and `blog_repo_name` decide the
/// default mode when none is given (§4.I: "canonicalize blog mode (vhost
/// flag or a repo description beginning with `+`)"); `repo_description`
/// supplies the latter trigger for the repo actually named in the path.
pub fn parse(
    raw_path: &str,
    blog_mode: bool,
    repo_description_starts_with_plus: bool,
) -> Result<ParsedPath, GitJsonError> {
    let (path_part, query_part) = match raw_path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (raw_path, None),
    };

    let mut segments = path_part.trim_matches('/').split('/');
    let repo_name = segments.next().filter(|s| !s.is_empty()).map(str::to_string);

    if let Some(name) = &repo_name {
        if name.contains("..") {
            return Err(GitJsonError::InvalidPath(format!(
                "repo name must not contain `..`: {name}"
            )));
        }
    }

    let mode_str = segments.next();
    let rest: Vec<&str> = segments.collect();
    let sub_path = rest.join("/");

    if sub_path.split('/').any(|seg| seg == "..") {
        return Err(GitJsonError::InvalidPath("sub-path must not contain `..`".into()));
    }

    let is_blog_mode = blog_mode || repo_description_starts_with_plus;

    let mode = match mode_str {
        Some(m) => Some(Mode::parse(m).ok_or_else(|| GitJsonError::InvalidPath(format!("unknown mode `{m}`")))?),
        None => {
            if is_blog_mode {
                Some(Mode::Blog)
            } else if repo_name.is_none() {
                Some(Mode::Repos)
            } else {
                Some(Mode::Tree)
            }
        }
    };

    let mut branch = None;
    let mut oid = None;
    let mut offset = None;
    let mut search = None;

    if let Some(q) = query_part {
        for pair in q.split('&') {
            let Some((k, v)) = pair.split_once('=') else {
                continue;
            };
            match k {
                "h" => branch = Some(v.to_string()),
                "id" => oid = Some(v.to_string()),
                "s" => offset = v.parse::<u64>().ok(),
                "q" => search = Some(percent_decode_plus(v)),
                _ => {}
            }
        }
    }

    Ok(ParsedPath {
        repo_name,
        mode,
        sub_path,
        branch,
        oid,
        offset,
        search,
    })
}

/// Minimal `application/x-www-form-urlencoded`-style decode for the `q`
/// query parameter: `+` becomes space, `%XX` becomes the byte.
fn percent_decode_plus(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '+' => out.push(' '),
            '%' => {
                let hi = chars.next();
                let lo = chars.next();
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    if let Ok(byte) = u8::from_str_radix(&format!("{hi}{lo}"), 16) {
                        out.push(byte as char);
                        continue;
                    }
                }
                out.push('%');
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_dotdot_in_repo_name() {
        assert!(parse("../etc/passwd", false, false).is_err());
    }

    #[test]
    fn rejects_dotdot_in_subpath() {
        assert!(parse("a/tree/../../etc", false, false).is_err());
    }

    #[test]
    fn empty_repo_name_defaults_to_repos_mode() {
        let p = parse("", false, false).unwrap();
        assert_eq!(p.mode, Some(Mode::Repos));
    }

    #[test]
    fn named_repo_with_no_mode_defaults_to_tree() {
        let p = parse("a", false, false).unwrap();
        assert_eq!(p.mode, Some(Mode::Tree));
    }

    #[test]
    fn blog_mode_vhost_flag_defaults_to_blog() {
        let p = parse("a", true, false).unwrap();
        assert_eq!(p.mode, Some(Mode::Blog));
    }

    #[test]
    fn blog_mode_from_repo_description_plus_prefix() {
        let p = parse("a", false, true).unwrap();
        assert_eq!(p.mode, Some(Mode::Blog));
    }

    #[test]
    fn parses_query_params() {
        let p = parse("a/log?h=dev&id=deadbeef&s=20&q=foo+bar", false, false).unwrap();
        assert_eq!(p.branch, Some("dev".to_string()));
        assert_eq!(p.oid, Some("deadbeef".to_string()));
        assert_eq!(p.offset, Some(20));
        assert_eq!(p.search, Some("foo bar".to_string()));
    }

    #[test]
    fn virtual_id_prefers_explicit_oid() {
        let p = parse("a/log?id=deadbeef&h=dev", false, false).unwrap();
        assert_eq!(p.virtual_id_candidates(), vec![VirtualId::Oid("deadbeef".into())]);
    }

    #[test]
    fn virtual_id_falls_back_to_master_then_main() {
        let p = parse("a/log", false, false).unwrap();
        assert_eq!(
            p.virtual_id_candidates(),
            vec![
                VirtualId::RefName("refs/heads/master".into()),
                VirtualId::RefName("refs/heads/main".into()),
            ]
        );
    }

    #[test]
    fn sub_path_after_mode_is_joined() {
        let p = parse("a/tree/src/lib.rs", false, false).unwrap();
        assert_eq!(p.sub_path, "src/lib.rs");
    }
}
