//! Gitolite helper process (§4.F, §6 "ACL helper IPC").
//!
//! One long-lived child per process, forked under the repository
//! directory owner's uid/gid, waiting on a request pipe for fixed-size
//! `{q[128], stdin_path[128], stdout_path[128]}` records and replying
//! with a single `int` on the result pipe. Requests are serialized by a
//! dedicated mutex (§5 "ACL query lock") so the result pipe reply is
//! unambiguous.
//!
//! Per §9 "Child process with pipes under uid/gid switch": the process
//! machinery is abstracted behind `QueryBackend`, an in-process fake
//! satisfies it for tests, and `GitoliteHelper` is the real libc-based
//! implementation.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::errors::GitJsonError;

/// Fixed-size IPC record, bit-exact with the original C struct (§6).
#[repr(C)]
struct Gl3Query {
    q: [u8; 128],
    stdin_path: [u8; 128],
    stdout_path: [u8; 128],
}

impl Gl3Query {
    fn new(args_line: &str, stdin_path: &str, stdout_path: &str) -> Self {
        let mut rec = Gl3Query {
            q: [0; 128],
            stdin_path: [0; 128],
            stdout_path: [0; 128],
        };
        copy_cstr(&mut rec.q, args_line);
        copy_cstr(&mut rec.stdin_path, stdin_path);
        copy_cstr(&mut rec.stdout_path, stdout_path);
        rec
    }

    fn as_bytes(&self) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(
                (self as *const Self) as *const u8,
                std::mem::size_of::<Self>(),
            )
        }
    }
}

fn copy_cstr(dst: &mut [u8; 128], s: &str) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(127);
    dst[..n].copy_from_slice(&bytes[..n]);
}

/// Capability that answers one gitolite query given `(args, stdin_path,
/// stdout_path)`, returning the helper's integer result code. Abstracted
/// so tests can substitute an in-process fake instead of forking a real
/// child (§9 "Child process with pipes under uid/gid switch").
pub trait QueryBackend: Send + Sync {
    fn query(&self, args_line: &str, stdin_path: &Path, stdout_path: &Path) -> Result<i32, GitJsonError>;
}

/// Real gitolite helper: a long-lived child process forked once per
/// process lifetime, communicating over two named pipes.
pub struct GitoliteHelper {
    request_lock: Mutex<()>,
    request_write: std::fs::File,
    result_read: Mutex<std::fs::File>,
    child_pid: libc::pid_t,
}

impl GitoliteHelper {
    /// Spawns the helper child, which setuids/setgids to `run_uid`/`run_gid`
    /// (the owning uid/gid of the repository directory tree) before
    /// executing `helper_argv0` (typically `gitolite`) in response to
    /// each query.
    pub fn spawn(helper_argv0: &str, run_uid: u32, run_gid: u32) -> Result<Self, GitJsonError> {
        let (req_read, req_write) = make_pipe()?;
        let (res_read, res_write) = make_pipe()?;

        let pid = unsafe { libc::fork() };
        if pid < 0 {
            return Err(GitJsonError::HelperError("fork failed".into()));
        }
        if pid == 0 {
            // Child: drop privileges then loop on the request pipe.
            unsafe {
                libc::close(req_write);
                libc::close(res_read);
                if libc::setgid(run_gid) != 0 || libc::setuid(run_uid) != 0 {
                    libc::_exit(1);
                }
            }
            child_loop(req_read, res_write, helper_argv0);
            unsafe { libc::_exit(0) };
        }

        unsafe {
            libc::close(req_read);
            libc::close(res_write);
        }

        Ok(Self {
            request_lock: Mutex::new(()),
            request_write: unsafe { <std::fs::File as std::os::fd::FromRawFd>::from_raw_fd(req_write) },
            result_read: Mutex::new(unsafe {
                <std::fs::File as std::os::fd::FromRawFd>::from_raw_fd(res_read)
            }),
            child_pid: pid,
        })
    }

    /// Probes for gitolite v3 semantics via `query-rc UMASK`; an empty
    /// stdout capture means v2, which is rejected (§4.F "Version probe",
    /// §9 supplemented feature 1).
    pub fn probe_version(&self) -> Result<(), GitJsonError> {
        let probe_out = std::env::temp_dir().join(format!("_gl3_probe_{}", std::process::id()));
        self.query("gitolite query-rc UMASK", Path::new("/dev/null"), &probe_out)?;
        let captured = std::fs::read_to_string(&probe_out).unwrap_or_default();
        let _ = std::fs::remove_file(&probe_out);
        if captured.trim().is_empty() {
            Err(GitJsonError::HelperVersionTooOld)
        } else {
            Ok(())
        }
    }

    fn send_shutdown(&self) {
        unsafe {
            libc::kill(self.child_pid, libc::SIGTERM);
        }
    }
}

impl Drop for GitoliteHelper {
    fn drop(&mut self) {
        self.send_shutdown();
    }
}

impl QueryBackend for GitoliteHelper {
    fn query(&self, args_line: &str, stdin_path: &Path, stdout_path: &Path) -> Result<i32, GitJsonError> {
        let _guard = self.request_lock.lock().unwrap();
        let rec = Gl3Query::new(
            args_line,
            &stdin_path.to_string_lossy(),
            &stdout_path.to_string_lossy(),
        );
        let mut w = &self.request_write;
        w.write_all(rec.as_bytes())
            .map_err(|e| GitJsonError::HelperError(e.to_string()))?;

        let mut buf = [0u8; 4];
        let mut r = self.result_read.lock().unwrap();
        r.read_exact(&mut buf)
            .map_err(|e| GitJsonError::HelperError(e.to_string()))?;
        Ok(i32::from_ne_bytes(buf))
    }
}

fn make_pipe() -> Result<(i32, i32), GitJsonError> {
    let mut fds = [0i32; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if rc != 0 {
        return Err(GitJsonError::HelperError("pipe() failed".into()));
    }
    Ok((fds[0], fds[1]))
}

/// Child-side request loop: for each fixed-size record, fork, redirect
/// stdin/stdout to the given paths, `execvp` the helper utility, and
/// write the exit code back.
fn child_loop(req_read: i32, res_write: i32, helper_argv0: &str) {
    use std::os::fd::FromRawFd;
    let mut req_file = unsafe { std::fs::File::from_raw_fd(req_read) };
    let mut res_file = unsafe { std::fs::File::from_raw_fd(res_write) };

    let rec_size = std::mem::size_of::<Gl3Query>();
    let mut buf = vec![0u8; rec_size];

    loop {
        if req_file.read_exact(&mut buf).is_err() {
            break;
        }
        let q = cstr_field(&buf[0..128]);
        let stdin_path = cstr_field(&buf[128..256]);
        let stdout_path = cstr_field(&buf[256..384]);

        let rc = run_one(helper_argv0, &q, &stdin_path, &stdout_path);
        let _ = res_file.write_all(&rc.to_ne_bytes());
    }
}

fn cstr_field(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).to_string()
}

fn run_one(helper_argv0: &str, args_line: &str, stdin_path: &str, stdout_path: &str) -> i32 {
    let mut parts = args_line.split_whitespace();
    let Some(_leading) = parts.next() else {
        return -1;
    };
    let rest: Vec<&str> = parts.collect();

    let stdin_file = std::fs::File::open(stdin_path).ok();
    let stdout_file = std::fs::File::create(stdout_path).ok();

    let mut cmd = std::process::Command::new(helper_argv0);
    cmd.args(&rest);
    if let Some(f) = stdin_file {
        cmd.stdin(f);
    } else {
        cmd.stdin(std::process::Stdio::null());
    }
    if let Some(f) = stdout_file {
        cmd.stdout(f);
    } else {
        cmd.stdout(std::process::Stdio::null());
    }

    match cmd.status() {
        Ok(status) => status.code().unwrap_or(-1),
        Err(_) => -1,
    }
}

/// In-process test double satisfying `QueryBackend` without forking
/// (§9 "abstract ... implementable as an in-process fake for testing").
pub struct FakeQueryBackend {
    pub version_probe_ok: bool,
    pub responses: Mutex<std::collections::HashMap<String, String>>,
}

impl FakeQueryBackend {
    pub fn new(version_probe_ok: bool) -> Self {
        Self {
            version_probe_ok,
            responses: Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn set_response(&self, args_line: &str, stdout_contents: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(args_line.to_string(), stdout_contents.to_string());
    }
}

impl QueryBackend for FakeQueryBackend {
    fn query(&self, args_line: &str, _stdin_path: &Path, stdout_path: &Path) -> Result<i32, GitJsonError> {
        if args_line.contains("UMASK") && !self.version_probe_ok {
            let _ = std::fs::write(stdout_path, "");
            return Ok(0);
        }
        let contents = self
            .responses
            .lock()
            .unwrap()
            .get(args_line)
            .cloned()
            .unwrap_or_default();
        std::fs::write(stdout_path, contents).map_err(|e| GitJsonError::HelperError(e.to_string()))?;
        Ok(0)
    }
}
