//! Context: the per-request state machine (§3 "Context", §4.H, §6 stable
//! API). One `Context` is created per boundary request and driven by
//! repeated `fill` calls until it reaches `Complete`.
//!
//! State machine: `HtmlHeadMeta -> HtmlHead -> Job1 -> Json -> HtmlTail ->
//! Complete`. Non-sandwich (pure JSON) requests skip straight from
//! `Job1`/`Json` to `Complete` without the HTML states. `patch` and
//! `plain` never enter the HTML states at all (§8 scenario 3 "no JSON
//! framing") — their bytes stream straight through with their own
//! content type, never wrapped in the stable envelope.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde_json::Value;

use crate::acl::ALL_USERS;
use crate::cache::{CacheWriter, DiskCache, QueryResult};
use crate::errors::GitJsonError;
use crate::fingerprint::{self, FingerprintInput, RepoMetadata, UnboundListContext};
use crate::hash::{Fingerprint, Oid};
use crate::job::engine::{BufferedProducer, Producer, StepOutcome};
use crate::job::envelope::{self, EnvelopeMeta, EpilogueTiming};
use crate::job::search::index::SearchIndex;
use crate::job::{self, JobKind};
use crate::purify;
use crate::repo::Repo;
use crate::urlpath::{self, Mode, ParsedPath};
use crate::vhost::Vhost;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    HtmlHeadMeta,
    HtmlHead,
    Job1,
    Json,
    HtmlTail,
    Complete,
}

/// Everything a caller must supply to open a context (§6 `context_create`).
pub struct ContextArgs {
    pub raw_path: String,
    /// Identity already authenticated by the host (HTTP auth, mTLS, etc.).
    /// `None` means anonymous.
    pub authorized_user: Option<String>,
    /// Whether to wrap the JSON in the vhost's HTML sandwich template.
    pub html: bool,
    pub offset: u64,
    pub count: u32,
    /// Caller's `Accept-Language`, echoed into the envelope's `alang`
    /// (§4.H "Epilogue": "something that's specific to the client").
    pub accept_language: Option<String>,
}

/// Outcome of `Context::create` (§6: "repo-open failure, ACL denial, OOM,
/// or OK").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStatus {
    Ok,
    RepoOpenFailed,
    AclDenied,
}

/// What `build_artifact` produced, before `start_job` decides whether it
/// needs the stable envelope (§6 "JSON envelope (stable)") or is one of
/// the two raw-bytes job kinds that bypass it entirely.
enum JobOutput {
    Json(Vec<Value>),
    Raw(Vec<u8>),
}

pub struct Context {
    vhost: Arc<Vhost>,
    repo: Option<Arc<Repo>>,
    parsed: ParsedPath,
    authorized_user: Option<String>,
    accept_language: Option<String>,
    html: bool,

    state: State,
    producer: Option<Box<dyn Producer>>,
    cache: Option<Arc<DiskCache>>,
    cache_writer: Option<CacheWriter>,
    fingerprint: Fingerprint,
    cache_suffix: Option<&'static str>,
    content_type: &'static str,
    started_at: Instant,

    /// Precomputed prefix/middle/suffix slices to emit around the JSON
    /// payload when `html` is set.
    html_prefix: String,
    html_middle: String,
    html_suffix: String,
    /// Byte offset already emitted from whichever static fragment is
    /// current, so `fill` is correct across arbitrarily small buffers
    /// (§8 "Boundaries").
    html_cursor: usize,
}

impl Context {
    /// `context_create` (§6): resolves the path, checks ACL, opens the
    /// repo if named, and builds the job producer. Never blocks on the
    /// job itself finishing — that happens across `fill` calls.
    pub fn create(vhost: Arc<Vhost>, args: ContextArgs) -> Result<(Self, CreateStatus), GitJsonError> {
        let blog_mode = vhost.config.blog_mode;
        let parsed = match urlpath::parse(&args.raw_path, blog_mode, false) {
            Ok(p) => p,
            Err(e) => return Err(e),
        };

        // patch/plain stream their own content type with no JSON framing
        // at all (§8 scenario 3), so they never enter the HTML sandwich
        // even if the caller asked for it.
        let job_kind = JobKind::from_mode(parsed.mode.unwrap_or(Mode::Repos));
        let html = args.html && !matches!(job_kind, JobKind::Patch | JobKind::Plain);

        let repo = match &parsed.repo_name {
            Some(name) => {
                let allowed = vhost.check_repo_access(name, effective_user(&args.authorized_user))?;
                if !allowed {
                    return Ok((
                        Self::empty(vhost, parsed, html, args.authorized_user, args.accept_language),
                        CreateStatus::AclDenied,
                    ));
                }
                match vhost.open_repo(name) {
                    Ok(repo) => {
                        repo.mark_context_attached();
                        Some(repo)
                    }
                    Err(_) => {
                        return Ok((
                            Self::empty(vhost, parsed, html, args.authorized_user, args.accept_language),
                            CreateStatus::RepoOpenFailed,
                        ));
                    }
                }
            }
            None => None,
        };

        let mut ctx = Self {
            vhost: vhost.clone(),
            repo,
            parsed,
            authorized_user: args.authorized_user,
            accept_language: args.accept_language,
            html,
            state: State::HtmlHeadMeta,
            producer: None,
            cache: vhost.cache.clone(),
            cache_writer: None,
            fingerprint: Fingerprint::default(),
            cache_suffix: None,
            content_type: "application/json",
            started_at: Instant::now(),
            html_prefix: String::new(),
            html_middle: String::new(),
            html_suffix: String::new(),
            html_cursor: 0,
        };
        ctx.prime_html_wrapper();
        ctx.start_job(args.offset, args.count)?;

        Ok((ctx, CreateStatus::Ok))
    }

    fn empty(vhost: Arc<Vhost>, parsed: ParsedPath, html: bool, authorized_user: Option<String>, accept_language: Option<String>) -> Self {
        Self {
            vhost,
            repo: None,
            parsed,
            authorized_user,
            accept_language,
            html,
            state: State::Complete,
            producer: None,
            cache: None,
            cache_writer: None,
            fingerprint: Fingerprint::default(),
            cache_suffix: None,
            content_type: "application/json",
            started_at: Instant::now(),
            html_prefix: String::new(),
            html_middle: String::new(),
            html_suffix: String::new(),
            html_cursor: 0,
        }
    }

    fn prime_html_wrapper(&mut self) {
        if !self.html {
            return;
        }
        if let Some(sandwich) = &self.vhost.sandwich {
            self.html_prefix = sandwich.prefix().to_string();
            self.html_middle = sandwich.middle().to_string();
            self.html_suffix = sandwich.suffix().to_string();
        } else {
            self.html = false; // no template configured: degrade to plain JSON
        }
    }

    /// §4.H "Cache interaction per job": compute fingerprint, query cache,
    /// then either stream the hit or build a live producer.
    fn start_job(&mut self, offset: u64, count: u32) -> Result<(), GitJsonError> {
        let mode = self.parsed.mode.unwrap_or(Mode::Repos);
        let job_kind = JobKind::from_mode(mode);
        self.content_type = content_type_for(job_kind, &self.parsed.sub_path);

        let repo_ref_fingerprint = self.repo.as_ref().map(|r| r.ref_fingerprint());
        let oid_in_view = self.resolve_oid_in_view()?;

        let current_repo_name = self.parsed.repo_name.as_deref();
        let other_repo_metadata: Vec<RepoMetadata> = self
            .vhost
            .repodir
            .all_reis()
            .iter()
            .filter(|rei| Some(rei.name.as_str()) != current_repo_name)
            .map(|rei| RepoMetadata {
                name: rei.name.clone(),
                description: rei.description.clone(),
                owner: rei.owner.clone(),
                url: rei.url.clone(),
            })
            .collect();

        let gitolite_admin_head = self.vhost.repodir.gitolite_admin_head();
        let mut visible_repo_names: Vec<String> = Vec::new();
        if self.repo.is_none() {
            for rei in self.vhost.repodir.all_reis() {
                let allowed = match &self.vhost.acl_resolver {
                    Some(resolver) => resolver.acl_check(&rei.name, effective_user(&self.authorized_user))?,
                    None => true,
                };
                if allowed {
                    visible_repo_names.push(rei.name.clone());
                }
            }
            visible_repo_names.sort();
        }

        let input = FingerprintInput {
            job_kind: job_kind.as_u8(),
            count: matches!(job_kind, JobKind::SearchIndex).then_some(count),
            search_term: self.parsed.search.as_deref(),
            repo_ref_fingerprint,
            repo_path: self.parsed.repo_name.as_deref(),
            mode: mode.as_str(),
            sub_path: &self.parsed.sub_path,
            oid_in_view: oid_in_view.as_ref(),
            other_repo_metadata: &other_repo_metadata,
            unbound_list_context: (self.repo.is_none()).then(|| UnboundListContext {
                gitolite_admin_head: gitolite_admin_head.as_ref(),
                visible_repo_names: &visible_repo_names,
            }),
        };
        self.fingerprint = fingerprint::compose(&self.vhost.config.md5_impl, &input);
        self.cache_suffix = cache_suffix_for(mode);

        if let Some(cache) = &self.cache {
            let ctx_tag = format!("{}-{}", std::process::id(), self.fingerprint.hex());
            match cache.query(&self.fingerprint, self.cache_suffix, true, &ctx_tag) {
                QueryResult::Exists { path, .. } => {
                    let bytes = std::fs::read(&path).unwrap_or_default();
                    self.producer = Some(Box::new(BufferedProducer::new(bytes)));
                    self.state = State::Job1;
                    return Ok(());
                }
                QueryResult::Creating { temp_path } => {
                    self.cache_writer = CacheWriter::create(temp_path).ok();
                }
                QueryResult::NoCache => {}
            }
        }

        let output = self.build_artifact(job_kind, oid_in_view.as_ref(), offset, count)?;
        let body = match output {
            JobOutput::Json(items) => {
                let meta = self.envelope_meta();
                let timing = self.epilogue_timing();
                let cid = self.fingerprint.hex();
                let env = envelope::wrap(meta, items, &cid, timing);
                let bytes = serde_json::to_vec(&env).unwrap_or_default();
                purify::purify_json_bytes(&bytes)
            }
            JobOutput::Raw(bytes) => bytes,
        };
        self.producer = Some(Box::new(BufferedProducer::new(body)));
        self.state = State::Job1;
        Ok(())
    }

    /// Builds the stable envelope's top-level metadata (§6 "JSON envelope
    /// (stable)"), sourced from this vhost's config and, when a repo is
    /// named, that repo's `Rei` entry.
    fn envelope_meta(&self) -> EnvelopeMeta {
        let rei = self.parsed.repo_name.as_deref().and_then(|name| self.vhost.repodir.get_rei(name));

        let mut f = 0u32;
        if self.repo.is_some() {
            f |= envelope::F_BLAME | envelope::F_ARCHIVE;
        }
        if self.vhost.config.blog_mode {
            f |= envelope::F_BLOG;
        }

        let gen_ut = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);

        EnvelopeMeta {
            vpath: self.vhost.config.virtual_base_urlpath.clone(),
            avatar: self.vhost.config.avatar_url.clone().unwrap_or_else(|| envelope::DEFAULT_AVATAR_BASE.to_string()),
            alang: self.accept_language.clone().unwrap_or_default(),
            gen_ut,
            reponame: rei.as_ref().map(|r| r.name.clone()).filter(|s| !s.is_empty()),
            desc: rei.as_ref().and_then(|r| r.description.clone()).filter(|s| !s.is_empty()),
            owner: rei.as_ref().and_then(|r| r.owner.clone()).filter(|s| !s.is_empty()),
            url: rei.as_ref().and_then(|r| r.url.clone()).filter(|s| !s.is_empty()),
            f,
        }
    }

    /// Builds the epilogue's generation timing and vhost-wide cache/etag
    /// hit percentages (§4.H "Epilogue").
    fn epilogue_timing(&self) -> EpilogueTiming {
        let gen_epoch_secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        let generation_us = self.started_at.elapsed().as_micros() as u64;
        let (chitpc, ehitpc) = match &self.cache {
            Some(cache) => (cache.hit_pct(), cache.etag_hit_pct()),
            None => (0, 0),
        };
        EpilogueTiming {
            gen_epoch_secs,
            generation_us,
            chitpc,
            ehitpc,
        }
    }

    fn resolve_oid_in_view(&self) -> Result<Option<Oid>, GitJsonError> {
        let Some(repo) = &self.repo else { return Ok(None) };
        for candidate in self.parsed.virtual_id_candidates() {
            let name_or_oid = match &candidate {
                crate::urlpath::VirtualId::Oid(oid) => oid.as_str(),
                crate::urlpath::VirtualId::RefName(name) => name.as_str(),
            };
            if let Some(oid) = repo.resolve_oid(name_or_oid) {
                return Ok(Some(oid));
            }
        }
        Ok(None)
    }

    fn build_artifact(&self, job_kind: JobKind, oid_in_view: Option<&Oid>, offset: u64, count: u32) -> Result<JobOutput, GitJsonError> {
        let repo = self.repo.as_ref();
        let reader = repo.map(|r| r.git_reader.as_ref());

        match job_kind {
            JobKind::Tags => Ok(JobOutput::Json(vec![job::reflist::build(
                &repo.map(|r| r.refs_by_name()).unwrap_or_default(),
                job::reflist::RefNamespace::Tags,
            )])),
            JobKind::Branches => Ok(JobOutput::Json(vec![job::reflist::build(
                &repo.map(|r| r.refs_by_name()).unwrap_or_default(),
                job::reflist::RefNamespace::Heads,
            )])),
            JobKind::Log => {
                let reader = reader.ok_or_else(|| GitJsonError::InvalidPath("log requires a repo".into()))?;
                let oid = oid_in_view.ok_or_else(|| GitJsonError::InvalidPath("no ref resolved".into()))?;
                Ok(JobOutput::Json(vec![job::log::build(reader, oid, offset, count)?]))
            }
            JobKind::Blog => {
                let reader = reader.ok_or_else(|| GitJsonError::InvalidPath("blog requires a repo".into()))?;
                let oid = oid_in_view.ok_or_else(|| GitJsonError::InvalidPath("no ref resolved".into()))?;
                Ok(JobOutput::Json(vec![job::blog::build(reader, oid, offset, count)?]))
            }
            JobKind::Tree => {
                let reader = reader.ok_or_else(|| GitJsonError::InvalidPath("tree requires a repo".into()))?;
                let oid = oid_in_view.ok_or_else(|| GitJsonError::InvalidPath("no ref resolved".into()))?;
                let repo_name = self.parsed.repo_name.as_deref().unwrap_or("repo");
                Ok(JobOutput::Json(job::tree::build(reader, oid, &self.parsed.sub_path, repo_name)?))
            }
            JobKind::Plain => {
                let reader = reader.ok_or_else(|| GitJsonError::InvalidPath("plain requires a repo".into()))?;
                let oid = oid_in_view.ok_or_else(|| GitJsonError::InvalidPath("no ref resolved".into()))?;
                let (bytes, _mime) = job::blob::build_plain_raw(reader, oid, &self.parsed.sub_path)?;
                Ok(JobOutput::Raw(bytes))
            }
            JobKind::Commit => {
                let reader = reader.ok_or_else(|| GitJsonError::InvalidPath("commit requires a repo".into()))?;
                let oid = oid_in_view.ok_or_else(|| GitJsonError::InvalidPath("no ref resolved".into()))?;
                Ok(JobOutput::Json(vec![job::commit::build(reader, oid)?]))
            }
            JobKind::Patch => {
                let reader = reader.ok_or_else(|| GitJsonError::InvalidPath("patch requires a repo".into()))?;
                let oid = oid_in_view.ok_or_else(|| GitJsonError::InvalidPath("no ref resolved".into()))?;
                Ok(JobOutput::Raw(job::commit::build_patch_text(reader, oid)?))
            }
            JobKind::Blame => {
                let reader = reader.ok_or_else(|| GitJsonError::InvalidPath("blame requires a repo".into()))?;
                let oid = oid_in_view.ok_or_else(|| GitJsonError::InvalidPath("no ref resolved".into()))?;
                Ok(JobOutput::Json(vec![job::blame::build(reader, oid, &self.parsed.sub_path)?]))
            }
            JobKind::Snapshot => {
                let reader = reader.ok_or_else(|| GitJsonError::InvalidPath("snapshot requires a repo".into()))?;
                let oid = oid_in_view.ok_or_else(|| GitJsonError::InvalidPath("no ref resolved".into()))?;
                let repo_name = self.parsed.repo_name.as_deref().unwrap_or("repo");
                Ok(JobOutput::Raw(job::snapshot::build(reader, oid, repo_name, job::snapshot::ArchiveFormat::TarGz)?))
            }
            JobKind::RepoList => {
                let reis = self.vhost.repodir.all_reis();
                Ok(JobOutput::Json(vec![job::repolist::build(
                    self.vhost.acl_resolver.as_deref(),
                    &reis,
                    effective_user(&self.authorized_user),
                )?]))
            }
            JobKind::Search | JobKind::Autocomplete | JobKind::FilePath | JobKind::SearchIndex => {
                let reader = reader.ok_or_else(|| GitJsonError::InvalidPath("search requires a repo".into()))?;
                let oid = oid_in_view.ok_or_else(|| GitJsonError::InvalidPath("no ref resolved".into()))?;
                let repo_name = self.parsed.repo_name.as_deref().unwrap_or("repo");
                let key = format!("{repo_name}@{}", oid.as_str());

                let index: Arc<SearchIndex> = if let Some(idx) = self.vhost.search_index.get(&key) {
                    idx
                } else if self.vhost.search_index.start_build(&key) {
                    match job::search::index::build(reader, oid) {
                        Ok(built) => {
                            let arc = Arc::new(built.clone());
                            self.vhost.search_index.publish(&key, built);
                            arc
                        }
                        Err(e) => {
                            self.vhost.search_index.cancel_build(&key);
                            return Err(e);
                        }
                    }
                } else {
                    // another caller already owns the build for this
                    // (repo, commit); signal "still indexing" rather than
                    // duplicating the tree walk (§4.H.4 "ongoing-index
                    // marker").
                    let mut still_indexing = serde_json::Map::new();
                    still_indexing.insert("schema".to_string(), Value::String("libjg2-1".to_string()));
                    still_indexing.insert("job".to_string(), Value::String("search".to_string()));
                    still_indexing.insert("indexed".to_string(), Value::Bool(false));
                    return Ok(JobOutput::Json(vec![Value::Object(still_indexing)]));
                };

                let term = self.parsed.search.as_deref().unwrap_or("");
                let item = match job_kind {
                    JobKind::Autocomplete => job::search::query::autocomplete(&index, term),
                    JobKind::FilePath => job::search::query::filepath(&index, term),
                    _ => job::search::query::search(&index, term),
                };
                Ok(JobOutput::Json(vec![item]))
            }
            JobKind::Summary => {
                let reader = reader.ok_or_else(|| GitJsonError::InvalidPath("summary requires a repo".into()))?;
                let oid = oid_in_view.ok_or_else(|| GitJsonError::InvalidPath("no ref resolved".into()))?;
                Ok(JobOutput::Json(vec![job::log::build(reader, oid, 0, job::log::DEFAULT_PAGE_COUNT)?]))
            }
        }
    }

    /// `context_fill` (§6): advances the state machine, writing as much
    /// of `buf` as it can. Returns bytes written and whether `Complete`
    /// was reached this call.
    pub fn fill(&mut self, buf: &mut [u8]) -> Result<(usize, bool), GitJsonError> {
        let mut written = 0;
        loop {
            match self.state {
                State::HtmlHeadMeta => {
                    let (n, done) =
                        Self::emit_static(&mut self.html_cursor, self.html_prefix.as_bytes(), &mut buf[written..]);
                    written += n;
                    if !done {
                        return Ok((written, false));
                    }
                    self.html_cursor = 0;
                    self.state = State::HtmlHead;
                    if written >= buf.len() {
                        return Ok((written, false));
                    }
                }
                State::HtmlHead => {
                    let (n, done) =
                        Self::emit_static(&mut self.html_cursor, self.html_middle.as_bytes(), &mut buf[written..]);
                    written += n;
                    if !done {
                        return Ok((written, false));
                    }
                    self.html_cursor = 0;
                    self.state = State::Job1;
                    if written >= buf.len() {
                        return Ok((written, false));
                    }
                }
                State::Job1 | State::Json => {
                    self.state = State::Json;
                    let Some(producer) = self.producer.as_mut() else {
                        self.state = State::HtmlTail;
                        continue;
                    };
                    let outcome: StepOutcome = producer.step(&mut buf[written..])?;
                    if let Some(writer) = &mut self.cache_writer {
                        writer.append(&buf[written..written + outcome.bytes_written]);
                    }
                    written += outcome.bytes_written;
                    if outcome.final_chunk {
                        self.finalize_cache_write();
                        self.state = if self.html { State::HtmlTail } else { State::Complete };
                    }
                    if written >= buf.len() {
                        return Ok((written, self.state == State::Complete));
                    }
                }
                State::HtmlTail => {
                    let (n, done) =
                        Self::emit_static(&mut self.html_cursor, self.html_suffix.as_bytes(), &mut buf[written..]);
                    written += n;
                    if done {
                        self.html_cursor = 0;
                        self.state = State::Complete;
                        return Ok((written, true));
                    }
                    return Ok((written, false));
                }
                State::Complete => return Ok((written, true)),
            }
        }
    }

    /// Copies as much of `chunk[*cursor..]` into `buf` as fits, advancing
    /// `*cursor`. Returns `(bytes_written, fragment_fully_emitted)` so
    /// callers can tell a full buffer apart from a finished fragment (§8
    /// "Boundaries" — correctness for any caller buffer size). Takes the
    /// cursor by reference rather than `&mut self` so callers can hold a
    /// `&self`-borrowed chunk (e.g. `self.html_prefix.as_bytes()`) alive
    /// across the call.
    fn emit_static(cursor: &mut usize, chunk: &[u8], buf: &mut [u8]) -> (usize, bool) {
        let remaining_chunk = &chunk[*cursor..];
        let n = remaining_chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining_chunk[..n]);
        *cursor += n;
        (n, *cursor == chunk.len())
    }

    fn finalize_cache_write(&mut self) {
        let (Some(cache), Some(writer)) = (&self.cache, self.cache_writer.take()) else {
            return;
        };
        if writer.is_broken() {
            cache.discard(writer.path());
            cache.disable_write();
            return;
        }
        if cache.finalize(writer.path(), &self.fingerprint, self.cache_suffix).is_err() {
            cache.disable_write();
        }
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    pub fn etag(&self) -> String {
        self.fingerprint.hex()
    }

    /// `context_destroy` (§6): releases the repo attachment and any
    /// in-flight producer/cache-write resources.
    pub fn destroy(mut self) {
        let still_running = !matches!(self.state, State::Complete);
        if let Some(producer) = &mut self.producer {
            if still_running {
                producer.destroy_while_running();
            } else {
                producer.destroy();
            }
        }
        if let Some(writer) = self.cache_writer.take() {
            if let Some(cache) = &self.cache {
                cache.discard(writer.path());
            }
        }
        if let Some(repo) = &self.repo {
            repo.mark_context_detached();
        }
    }
}

fn cache_suffix_for(mode: Mode) -> Option<&'static str> {
    match mode {
        Mode::Snapshot => Some("tar.gz"),
        _ => None,
    }
}

/// Content type for one job kind (§8 scenario 3): `patch` is raw
/// `text/plain`, `plain` guesses from the path suffix, everything else is
/// the stable JSON envelope.
fn content_type_for(job_kind: JobKind, sub_path: &str) -> &'static str {
    match job_kind {
        JobKind::Patch => "text/plain; charset=utf-8",
        JobKind::Plain => job::blob::guess_mime(sub_path),
        _ => "application/json",
    }
}

/// `@all` is never an externally-authenticated identity; treat it as
/// anonymous rather than letting a client spoof it (§4.E).
fn effective_user(user: &Option<String>) -> Option<&str> {
    match user.as_deref() {
        Some(ALL_USERS) | None => None,
        Some(u) => Some(u),
    }
}
