//! `plain` producer (§4.H.1 "blob"): raw file bytes streamed with their
//! own Content-Type guessed from the path suffix, with no JSON framing
//! at all (§8 scenario 3) — this is one of the two job kinds, alongside
//! `patch`, that never passes through the stable envelope.

use crate::errors::GitJsonError;
use crate::git_reader::{GitReader, PathResolution};
use crate::hash::Oid;

/// Suffix-to-MIME table (§4.H.1 "blob": "suffix -> mime table"). Ordered
/// by how often each extension shows up in a typical source tree.
const MIME_TABLE: &[(&str, &str)] = &[
    ("rs", "text/x-rust"),
    ("c", "text/x-c"),
    ("h", "text/x-c"),
    ("cpp", "text/x-c++"),
    ("hpp", "text/x-c++"),
    ("py", "text/x-python"),
    ("js", "text/javascript"),
    ("ts", "text/x-typescript"),
    ("json", "application/json"),
    ("md", "text/markdown"),
    ("markdown", "text/markdown"),
    ("txt", "text/plain"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("toml", "text/x-toml"),
    ("yaml", "text/yaml"),
    ("yml", "text/yaml"),
    ("sh", "text/x-shellscript"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("pdf", "application/pdf"),
];

pub fn guess_mime(path: &str) -> &'static str {
    let suffix = path.rsplit('.').next().unwrap_or("");
    MIME_TABLE
        .iter()
        .find(|(ext, _)| ext.eq_ignore_ascii_case(suffix))
        .map(|(_, mime)| *mime)
        .unwrap_or("application/octet-stream")
}

/// Resolves `sub_path` at `commit_oid` to a blob and returns its raw
/// bytes plus guessed Content-Type; no JSON wrapping, no base64 (§4.H.1).
pub fn build_plain_raw(reader: &dyn GitReader, commit_oid: &Oid, sub_path: &str) -> Result<(Vec<u8>, &'static str), GitJsonError> {
    let resolution = reader.resolve_path(commit_oid, sub_path)?;
    let oid = match resolution {
        PathResolution::Blob { oid, .. } => oid,
        PathResolution::Tree { .. } => {
            return Err(GitJsonError::InvalidPath(format!("`{sub_path}` is a directory, not a file")));
        }
        PathResolution::NotFound => {
            return Err(GitJsonError::InvalidPath(format!("`{sub_path}` not found")));
        }
    };
    let bytes = reader.read_blob(&oid)?;
    Ok((bytes, guess_mime(sub_path)))
}
