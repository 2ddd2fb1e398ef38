//! Stable outer JSON envelope (§6 "JSON envelope (stable)"): the one
//! shape every JSON-producing job is wrapped in, regardless of job kind.
//! Patch (raw unified diff) and plain (raw blob bytes) responses never
//! pass through here — they stream their own content type instead,
//! per §8 scenario 3's "no JSON framing".
//!
//! Grounded on `lib/job/job.c`'s `meta_header`/`meta_trailer` pair, which
//! write this same opening-brace-then-items-then-trailer shape a field at
//! a time over the life of a context; this crate builds each job's
//! artifact eagerly already (see `job::engine`'s own recorded
//! simplification), so the envelope is assembled the same way, as one
//! `serde`-derived value rather than incremental `CTX_BUF_APPEND` calls.

use serde::Serialize;
use serde_json::Value;

use super::{Epilogue, EpilogueStats};

/// `f` bitfield bit positions (`meta_header`: "f b0 = capable of blame,
/// b1 = capable of archiving, b2 = blog mode").
pub const F_BLAME: u32 = 1 << 0;
pub const F_ARCHIVE: u32 = 1 << 1;
pub const F_BLOG: u32 = 1 << 2;

#[derive(Debug, Serialize)]
pub struct Envelope {
    pub schema: &'static str,
    pub vpath: String,
    pub avatar: String,
    pub alang: String,
    pub gen_ut: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reponame: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub f: u32,
    pub items: Vec<Value>,
    #[serde(flatten)]
    pub epilogue: Epilogue,
}

/// Default gravatar base used when the vhost has no `avatar_url`
/// configured, matching `meta_header`'s `"//www.gravatar.com/avatar/"`.
pub const DEFAULT_AVATAR_BASE: &str = "//www.gravatar.com/avatar/";

pub struct EnvelopeMeta {
    pub vpath: String,
    pub avatar: String,
    pub alang: String,
    pub gen_ut: u64,
    pub reponame: Option<String>,
    pub desc: Option<String>,
    pub owner: Option<String>,
    pub url: Option<String>,
    pub f: u32,
}

pub struct EpilogueTiming {
    pub gen_epoch_secs: u64,
    pub generation_us: u64,
    pub chitpc: u32,
    pub ehitpc: u32,
}

/// Wraps one or more per-job item values in the stable envelope, with
/// `cid` stamped onto each item and the epilogue sealed on at the end.
pub fn wrap(meta: EnvelopeMeta, mut items: Vec<Value>, cid: &str, timing: EpilogueTiming) -> Envelope {
    for item in &mut items {
        if let Value::Object(map) = item {
            map.insert("cid".to_string(), Value::String(cid.to_string()));
        }
    }
    Envelope {
        schema: "libjg2-1",
        vpath: meta.vpath,
        avatar: meta.avatar,
        alang: meta.alang,
        gen_ut: meta.gen_ut,
        reponame: meta.reponame,
        desc: meta.desc,
        owner: meta.owner,
        url: meta.url,
        f: meta.f,
        items,
        epilogue: Epilogue {
            stats: EpilogueStats {
                c: timing.gen_epoch_secs,
                u: timing.generation_us,
            },
            generation_us: timing.generation_us,
            chitpc: timing.chitpc,
            ehitpc: timing.ehitpc,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wrap_stamps_cid_onto_every_item() {
        let items = vec![json!({"schema": "libjg2-1", "job": "tree"})];
        let meta = EnvelopeMeta {
            vpath: "/".into(),
            avatar: DEFAULT_AVATAR_BASE.into(),
            alang: String::new(),
            gen_ut: 1,
            reponame: Some("a.git".into()),
            desc: None,
            owner: None,
            url: None,
            f: F_BLAME | F_ARCHIVE,
        };
        let timing = EpilogueTiming {
            gen_epoch_secs: 1,
            generation_us: 10,
            chitpc: 50,
            ehitpc: 0,
        };
        let env = wrap(meta, items, "abcd1234", timing);
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["items"][0]["cid"], "abcd1234");
        assert_eq!(v["reponame"], "a.git");
        assert_eq!(v["f"], 3);
        assert_eq!(v["s"]["u"], 10);
        assert_eq!(v["chitpc"], 50);
    }

    #[test]
    fn reponame_absent_when_not_bound_to_a_repo() {
        let meta = EnvelopeMeta {
            vpath: "/".into(),
            avatar: DEFAULT_AVATAR_BASE.into(),
            alang: String::new(),
            gen_ut: 1,
            reponame: None,
            desc: None,
            owner: None,
            url: None,
            f: 0,
        };
        let timing = EpilogueTiming {
            gen_epoch_secs: 1,
            generation_us: 1,
            chitpc: 0,
            ehitpc: 0,
        };
        let env = wrap(meta, vec![json!({"job": "repos"})], "x", timing);
        let v = serde_json::to_value(&env).unwrap();
        assert!(v.get("reponame").is_none());
    }
}
