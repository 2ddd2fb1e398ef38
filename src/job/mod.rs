//! Job engine (§4.H): one producer per job kind, dispatched by `urlpath::Mode`.
//!
//! Most producers here return one or more `serde_json::Value` artifacts,
//! which `context.rs` stamps with a `cid` and wraps in the stable
//! `envelope::Envelope` before serializing once and handing the bytes to
//! `engine::BufferedProducer`. `patch` and `plain` are the exceptions:
//! they bypass the envelope entirely and produce raw bytes with their own
//! content type (§8 scenario 3's "no JSON framing").

pub mod blame;
pub mod blob;
pub mod blog;
pub mod commit;
pub mod engine;
pub mod envelope;
pub mod log;
pub mod reflist;
pub mod repolist;
pub mod search;
pub mod snapshot;
pub mod tree;

/// Stable numeric tag for each job kind, fed into the fingerprint's first
/// field (§4.G item 1) so that changing job kind always changes the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    RefList = 0,
    Log = 1,
    Commit = 2,
    Patch = 3,
    Tree = 4,
    Plain = 5,
    RepoList = 6,
    Blog = 7,
    Snapshot = 8,
    Blame = 9,
    SearchIndex = 10,
    Search = 11,
    Autocomplete = 12,
    FilePath = 13,
    Tags = 14,
    Branches = 15,
    Summary = 16,
}

impl JobKind {
    pub fn from_mode(mode: crate::urlpath::Mode) -> Self {
        use crate::urlpath::Mode as M;
        match mode {
            M::Log => JobKind::Log,
            M::Tree => JobKind::Tree,
            M::Blame => JobKind::Blame,
            M::Plain => JobKind::Plain,
            M::Commit => JobKind::Commit,
            M::Patch => JobKind::Patch,
            M::Snapshot => JobKind::Snapshot,
            M::Tags => JobKind::Tags,
            M::Branches => JobKind::Branches,
            M::Summary => JobKind::Summary,
            M::Repos => JobKind::RepoList,
            M::Blog => JobKind::Blog,
            M::Autocomplete => JobKind::Autocomplete,
            M::FilePath => JobKind::FilePath,
            M::Search => JobKind::Search,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Epilogue trailer appended to every JSON artifact (§4.H "Epilogue"):
/// generation timing plus vhost-wide cache/etag hit percentages, sealed
/// onto the envelope right before the final chunk.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Epilogue {
    #[serde(rename = "s")]
    pub stats: EpilogueStats,
    /// Microseconds spent generating this response end to end.
    #[serde(rename = "g")]
    pub generation_us: u64,
    /// Vhost cache-hit percentage (0-100) over all queries so far.
    pub chitpc: u32,
    /// Same, for ETag-conditional (304-equivalent) hits.
    pub ehitpc: u32,
}

/// Per-job generation timing (§4.H "Epilogue": `"s":{"c":...,"u":...}`).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct EpilogueStats {
    /// Generation wall-clock epoch, seconds.
    pub c: u64,
    /// Generation wall-clock, microseconds elapsed.
    pub u: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_kind_from_mode_round_trips_log() {
        assert_eq!(JobKind::from_mode(crate::urlpath::Mode::Log).as_u8(), JobKind::Log as u8);
    }

    #[test]
    fn epilogue_serializes_with_short_field_names() {
        let epi = Epilogue {
            stats: EpilogueStats { c: 1_700_000_000, u: 4821 },
            generation_us: 5200,
            chitpc: 90,
            ehitpc: 0,
        };
        let v = serde_json::to_value(&epi).unwrap();
        assert_eq!(v["g"], 5200);
        assert_eq!(v["s"]["c"], 1_700_000_000);
        assert_eq!(v["s"]["u"], 4821);
        assert_eq!(v["chitpc"], 90);
    }
}
