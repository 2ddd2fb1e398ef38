//! Vhost configuration (§3 "Vhost").
//!
//! Mirrors the shape of a C `struct jg2_vhost_config`: a handful of
//! mandatory fields plus a long tail of optional knobs with sane defaults.
//! Serializable so a host can load it from a config file if it wants to,
//! the way the teacher library's `PackConfig`/`LfsConfig` do.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

use crate::hash::Md5Impl;

/// Long-lived configuration bound to one `Vhost` (§3).
#[derive(Clone)]
pub struct VhostConfig {
    /// Mandatory. Like `/git`.
    pub virtual_base_urlpath: String,
    /// Mandatory. Like `/srv/repositories`.
    pub repo_base_dir: PathBuf,

    /// Gitolite identity checked for read access before showing a repo on
    /// this vhost at all. `None` disables the vhost-level ACL gate.
    pub acl_user: Option<String>,

    /// Optional HTML sandwich template path (§6 "HTML sandwich").
    pub html_template_path: Option<PathBuf>,
    /// Base URL for avatar images; defaults to gravatar.
    pub avatar_url: Option<String>,
    /// Directory for JSON artifact cache; `None` disables caching entirely.
    pub json_cache_base: Option<PathBuf>,

    /// Goal for max cache size in bytes. 0 means use the default (256 MiB).
    #[doc(alias = "cache_size_limit")]
    pub cache_size_limit: u64,
    /// If nonzero, chown the cache directory tree to this uid.
    pub cache_uid: u32,

    /// Email-cache hash bin count. 0 defaults to 16.
    pub email_hash_bins: usize,
    /// Max emails per hash bin. 0 defaults to 16.
    pub email_hash_depth: usize,

    /// Blog mode: treat one repo's commit log as a blog feed.
    pub blog_mode: bool,
    /// Repo name to use as the blog, when `blog_mode` is set.
    pub blog_repo_name: Option<String>,

    /// Pluggable MD5 implementation (§9 "Optional MD5 implementation").
    pub md5_impl: Md5Impl,
}

impl VhostConfig {
    /// Effective cache size limit, applying the documented default.
    pub fn effective_cache_size_limit(&self) -> u64 {
        if self.cache_size_limit == 0 {
            256 * 1024 * 1024
        } else {
            self.cache_size_limit
        }
    }

    /// Effective email hash bin count, applying the documented default.
    pub fn effective_email_hash_bins(&self) -> usize {
        if self.email_hash_bins == 0 {
            16
        } else {
            self.email_hash_bins
        }
    }

    /// Effective per-bin email cache depth, applying the documented default.
    pub fn effective_email_hash_depth(&self) -> usize {
        if self.email_hash_depth == 0 {
            16
        } else {
            self.email_hash_depth
        }
    }

    pub fn validate(&self) -> Result<(), crate::errors::GitJsonError> {
        if self.virtual_base_urlpath.is_empty() {
            return Err(crate::errors::GitJsonError::InvalidConfig(
                "virtual_base_urlpath must not be empty".into(),
            ));
        }
        if !self.repo_base_dir.is_dir() {
            return Err(crate::errors::GitJsonError::InvalidConfig(format!(
                "repo_base_dir `{}` is not a directory",
                self.repo_base_dir.display()
            )));
        }
        if self.blog_mode && self.blog_repo_name.is_none() {
            return Err(crate::errors::GitJsonError::InvalidConfig(
                "blog_mode requires blog_repo_name".into(),
            ));
        }
        Ok(())
    }
}

impl Default for VhostConfig {
    fn default() -> Self {
        Self {
            virtual_base_urlpath: "/git".to_string(),
            repo_base_dir: PathBuf::from("/srv/repositories"),
            acl_user: None,
            html_template_path: None,
            avatar_url: None,
            json_cache_base: None,
            cache_size_limit: 0,
            cache_uid: 0,
            email_hash_bins: 0,
            email_hash_depth: 0,
            blog_mode: false,
            blog_repo_name: None,
            md5_impl: Md5Impl::default(),
        }
    }
}

/// On-disk / serializable projection of `VhostConfig`, for hosts that want
/// to load vhosts from a config file. Byte-size-like fields accept either a
/// bare integer or a human string (`"256M"`), same convention as the
/// teacher's `PackConfig::pack_decode_mem_size`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VhostConfigFile {
    pub virtual_base_urlpath: String,
    pub repo_base_dir: PathBuf,
    pub acl_user: Option<String>,
    pub html_template_path: Option<PathBuf>,
    pub avatar_url: Option<String>,
    pub json_cache_base: Option<PathBuf>,
    #[serde(default, deserialize_with = "string_or_u64")]
    pub cache_size_limit: u64,
    #[serde(default)]
    pub cache_uid: u32,
    #[serde(default)]
    pub email_hash_bins: usize,
    #[serde(default)]
    pub email_hash_depth: usize,
    #[serde(default)]
    pub blog_mode: bool,
    #[serde(default)]
    pub blog_repo_name: Option<String>,
}

impl From<VhostConfigFile> for VhostConfig {
    fn from(f: VhostConfigFile) -> Self {
        Self {
            virtual_base_urlpath: f.virtual_base_urlpath,
            repo_base_dir: f.repo_base_dir,
            acl_user: f.acl_user,
            html_template_path: f.html_template_path,
            avatar_url: f.avatar_url,
            json_cache_base: f.json_cache_base,
            cache_size_limit: f.cache_size_limit,
            cache_uid: f.cache_uid,
            email_hash_bins: f.email_hash_bins,
            email_hash_depth: f.email_hash_depth,
            blog_mode: f.blog_mode,
            blog_repo_name: f.blog_repo_name,
            md5_impl: Md5Impl::default(),
        }
    }
}

fn string_or_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrU64 {
        String(String),
        U64(u64),
    }

    Ok(match StringOrU64::deserialize(deserializer)? {
        StringOrU64::U64(v) => v,
        StringOrU64::String(v) => parse_size(&v).unwrap_or(0),
    })
}

/// Parses sizes like `"256M"`, `"1G"`, `"4096"` into a byte count.
fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim();
    let (num, mult) = match s.chars().last() {
        Some('k') | Some('K') => (&s[..s.len() - 1], 1024u64),
        Some('m') | Some('M') => (&s[..s.len() - 1], 1024 * 1024),
        Some('g') | Some('G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1),
    };
    num.trim().parse::<u64>().ok().map(|n| n * mult)
}
