//! Content-addressed disk cache (§4.B).
//!
//! Path layout: `base/<hex0>/<hex1>/<hex32>[-suffix]`. A file existing
//! under its canonical name means "committed"; a file named
//! `<hex32>~<pid>-<ctxptr>` means "in progress". Readers only ever see
//! canonical names, so a concurrent writer never corrupts a reader's view
//! (invariant 1/2, spec §3).

pub mod trim;

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::GitJsonError;
use crate::hash::Fingerprint;

/// Outcome of a cache query (§4.B `query`).
#[derive(Debug)]
pub enum QueryResult {
    /// The canonical file exists; `path` and `size` are populated.
    Exists { path: PathBuf, size: u64 },
    /// `allow_create` was set and no canonical file existed; caller should
    /// write to `temp_path` and call `finalize` when done.
    Creating { temp_path: PathBuf },
    /// Caching is disabled for this cache instance.
    NoCache,
}

/// One content-addressed disk cache rooted at `base_dir`.
pub struct DiskCache {
    base_dir: PathBuf,
    uid: Option<u32>,
    write_disabled: std::sync::atomic::AtomicBool,
    /// Running hit/query and etag-hit/query counters, surfaced in every
    /// job's epilogue as `chitpc`/`ehitpc` (§4.H "Epilogue"). `etag_*`
    /// stays at zero until a conditional-request path increments it.
    cache_hits: std::sync::atomic::AtomicU64,
    cache_tries: std::sync::atomic::AtomicU64,
    etag_hits: std::sync::atomic::AtomicU64,
    etag_tries: std::sync::atomic::AtomicU64,
}

impl DiskCache {
    pub fn new(base_dir: PathBuf, uid: Option<u32>) -> Self {
        Self {
            base_dir,
            uid,
            write_disabled: std::sync::atomic::AtomicBool::new(false),
            cache_hits: std::sync::atomic::AtomicU64::new(0),
            cache_tries: std::sync::atomic::AtomicU64::new(0),
            etag_hits: std::sync::atomic::AtomicU64::new(0),
            etag_tries: std::sync::atomic::AtomicU64::new(0),
        }
    }

    fn shard_dir(&self, fp: &Fingerprint) -> PathBuf {
        let (h0, h1) = fp.shard();
        self.base_dir.join(h0.to_string()).join(h1.to_string())
    }

    fn canonical_path(&self, fp: &Fingerprint, suffix: Option<&str>) -> PathBuf {
        let name = match suffix {
            Some(s) => format!("{}-{}", fp.hex(), s),
            None => fp.hex(),
        };
        self.shard_dir(fp).join(name)
    }

    fn temp_path(&self, fp: &Fingerprint, suffix: Option<&str>, ctx_tag: &str) -> PathBuf {
        let pid = std::process::id();
        let name = match suffix {
            Some(s) => format!("{}-{}~{}-{}", fp.hex(), s, pid, ctx_tag),
            None => format!("{}~{}-{}", fp.hex(), pid, ctx_tag),
        };
        self.shard_dir(fp).join(name)
    }

    /// Queries the cache for `fp`, optionally creating a write-temp path
    /// if absent and `allow_create` is set. `ctx_tag` disambiguates
    /// concurrent writers for the same key (spec: `~<pid>-<ctxptr>`).
    pub fn query(
        &self,
        fp: &Fingerprint,
        suffix: Option<&str>,
        allow_create: bool,
        ctx_tag: &str,
    ) -> QueryResult {
        self.cache_tries.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let canonical = self.canonical_path(fp, suffix);
        match fs::metadata(&canonical) {
            Ok(meta) => {
                self.cache_hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                // Touch on hit (§4.B "Touch on hit"): refresh mtime so LRU
                // trim orders by last access, not creation.
                if let Ok(file) = File::open(&canonical) {
                    let _ = file.set_modified(std::time::SystemTime::now());
                }
                QueryResult::Exists {
                    path: canonical,
                    size: meta.len(),
                }
            }
            Err(_) if allow_create => {
                if let Err(e) = fs::create_dir_all(self.shard_dir(fp)) {
                    tracing::warn!(error = %e, "cache shard dir creation failed, degrading to NO_CACHE");
                    return QueryResult::NoCache;
                }
                QueryResult::Creating {
                    temp_path: self.temp_path(fp, suffix, ctx_tag),
                }
            }
            Err(_) => QueryResult::NoCache,
        }
    }

    /// Integer cache-hit percentage (0-100) over every `query` call so
    /// far, surfaced in the epilogue's `chitpc` (§4.H).
    pub fn hit_pct(&self) -> u32 {
        percent(
            self.cache_hits.load(std::sync::atomic::Ordering::Relaxed),
            self.cache_tries.load(std::sync::atomic::Ordering::Relaxed),
        )
    }

    /// Same, for ETag-conditional (304-equivalent) hits (`ehitpc`).
    pub fn etag_hit_pct(&self) -> u32 {
        percent(
            self.etag_hits.load(std::sync::atomic::Ordering::Relaxed),
            self.etag_tries.load(std::sync::atomic::Ordering::Relaxed),
        )
    }

    /// Publishes a completed temp file by atomic rename, stripping the
    /// `~<pid>-<ctx>` suffix. Whichever of two racing writers renames
    /// first wins; the loser's rename fails silently (its bytes are
    /// identical anyway, since both are computed from the same fingerprint
    /// inputs) and it must unlink its own temp.
    pub fn finalize(&self, temp_path: &Path, fp: &Fingerprint, suffix: Option<&str>) -> Result<(), GitJsonError> {
        let canonical = self.canonical_path(fp, suffix);
        match fs::rename(temp_path, &canonical) {
            Ok(()) => {
                if let Some(uid) = self.uid {
                    let _ = chown_best_effort(&canonical, uid);
                }
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(temp_path);
                Err(GitJsonError::Cache(e.to_string()))
            }
        }
    }

    /// Discards a temp file on failure (§4.B "Failure semantics").
    pub fn discard(&self, temp_path: &Path) {
        let _ = fs::remove_file(temp_path);
    }

    pub fn is_write_disabled(&self) -> bool {
        self.write_disabled.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Disables cache writes for the remainder of this process's
    /// lifetime after an I/O error mid-write (§4.B "Failure semantics").
    /// Scoping this per-job rather than per-cache is left to the caller;
    /// the flag here represents "this job has seen a write failure".
    pub fn disable_write(&self) {
        self.write_disabled.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

fn percent(hits: u64, tries: u64) -> u32 {
    if tries == 0 {
        return 0;
    }
    ((hits * 100) / tries) as u32
}

/// A write handle for one cache temp file: callers append bytes, and on
/// any I/O error the handle reports itself broken so the caller can fall
/// back to live (uncached) output.
pub struct CacheWriter {
    file: File,
    path: PathBuf,
    broken: bool,
}

impl CacheWriter {
    pub fn create(temp_path: PathBuf) -> Result<Self, GitJsonError> {
        let file = File::create(&temp_path)?;
        Ok(Self {
            file,
            path: temp_path,
            broken: false,
        })
    }

    /// Appends bytes; on error, marks broken (caller should then call
    /// `abandon` and continue live).
    pub fn append(&mut self, bytes: &[u8]) -> bool {
        if self.broken {
            return false;
        }
        if self.file.write_all(bytes).is_err() {
            self.broken = true;
            return false;
        }
        true
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }
}

#[cfg(unix)]
fn chown_best_effort(path: &Path, uid: u32) -> std::io::Result<()> {
    use std::ffi::CString;
    let c_path = CString::new(path.as_os_str().to_string_lossy().as_bytes())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "nul in path"))?;
    let rc = unsafe { libc::chown(c_path.as_ptr(), uid, u32::MAX) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn chown_best_effort(_path: &Path, _uid: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fp(byte: u8) -> Fingerprint {
        Fingerprint([byte; 16])
    }

    #[test]
    fn query_miss_then_create_then_commit_is_visible() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(dir.path().to_path_buf(), None);
        let f = fp(9);

        match cache.query(&f, None, true, "1-1") {
            QueryResult::Creating { temp_path } => {
                let mut w = CacheWriter::create(temp_path.clone()).unwrap();
                assert!(w.append(b"hello"));
                cache.finalize(&temp_path, &f, None).unwrap();
            }
            other => panic!("expected Creating, got {other:?}"),
        }

        match cache.query(&f, None, false, "2-2") {
            QueryResult::Exists { size, .. } => assert_eq!(size, 5),
            other => panic!("expected Exists, got {other:?}"),
        }
    }

    #[test]
    fn query_without_allow_create_on_miss_is_no_cache() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(dir.path().to_path_buf(), None);
        match cache.query(&fp(1), None, false, "1-1") {
            QueryResult::NoCache => {}
            other => panic!("expected NoCache, got {other:?}"),
        }
    }

    #[test]
    fn suffix_namespaces_distinct_artifacts_under_same_key() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(dir.path().to_path_buf(), None);
        let f = fp(3);

        if let QueryResult::Creating { temp_path } = cache.query(&f, Some("gz"), true, "1-1") {
            let mut w = CacheWriter::create(temp_path.clone()).unwrap();
            w.append(b"archive-bytes");
            cache.finalize(&temp_path, &f, Some("gz")).unwrap();
        }

        // Plain (no suffix) key is still a miss.
        match cache.query(&f, None, false, "1-1") {
            QueryResult::NoCache => {}
            other => panic!("expected NoCache for unsuffixed key, got {other:?}"),
        }
        match cache.query(&f, Some("gz"), false, "1-1") {
            QueryResult::Exists { .. } => {}
            other => panic!("expected Exists for suffixed key, got {other:?}"),
        }
    }

    #[test]
    fn discard_removes_temp_file() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(dir.path().to_path_buf(), None);
        let f = fp(5);
        if let QueryResult::Creating { temp_path } = cache.query(&f, None, true, "1-1") {
            let w = CacheWriter::create(temp_path.clone()).unwrap();
            drop(w);
            assert!(temp_path.exists());
            cache.discard(&temp_path);
            assert!(!temp_path.exists());
        } else {
            panic!("expected Creating");
        }
    }

    #[test]
    fn hit_pct_tracks_queries_across_misses_and_hits() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(dir.path().to_path_buf(), None);
        let f = fp(7);
        assert_eq!(cache.hit_pct(), 0);

        if let QueryResult::Creating { temp_path } = cache.query(&f, None, true, "1-1") {
            let mut w = CacheWriter::create(temp_path.clone()).unwrap();
            w.append(b"x");
            cache.finalize(&temp_path, &f, None).unwrap();
        }
        // one miss so far (the Creating query above)
        assert_eq!(cache.hit_pct(), 0);

        cache.query(&f, None, false, "2-2"); // hit
        // 1 hit out of 2 tries
        assert_eq!(cache.hit_pct(), 50);
    }

    #[test]
    fn etag_hit_pct_is_zero_with_no_etag_tries() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(dir.path().to_path_buf(), None);
        assert_eq!(cache.etag_hit_pct(), 0);
    }
}
