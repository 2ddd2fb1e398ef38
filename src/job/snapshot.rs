//! `snapshot` producer (§4.H.1 "snapshot"): packages a commit's tree as a
//! downloadable archive in one of four formats.

use std::io::Write;
use std::path::PathBuf;

use crate::errors::GitJsonError;
use crate::git_reader::GitReader;
use crate::hash::Oid;
use crate::job::commit::flatten_commit_tree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    TarBz2,
    TarXz,
    Zip,
}

impl ArchiveFormat {
    pub fn suffix(&self) -> &'static str {
        match self {
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::TarBz2 => "tar.bz2",
            ArchiveFormat::TarXz => "tar.xz",
            ArchiveFormat::Zip => "zip",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ArchiveFormat::TarGz | ArchiveFormat::TarBz2 | ArchiveFormat::TarXz => "application/x-tar",
            ArchiveFormat::Zip => "application/zip",
        }
    }
}

fn build_tar(files: &[(PathBuf, Vec<u8>)], prefix: &str) -> Result<Vec<u8>, GitJsonError> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, bytes) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o100644);
        header.set_cksum();
        let archive_path = format!("{prefix}/{}", path.display());
        builder
            .append_data(&mut header, archive_path, bytes.as_slice())
            .map_err(|e| GitJsonError::Archive(e.to_string()))?;
    }
    builder.into_inner().map_err(|e| GitJsonError::Archive(e.to_string()))
}

fn build_zip(files: &[(PathBuf, Vec<u8>)], prefix: &str) -> Result<Vec<u8>, GitJsonError> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options: zip::write::FileOptions<'_, ()> =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (path, bytes) in files {
            let archive_path = format!("{prefix}/{}", path.display());
            writer
                .start_file(archive_path, options)
                .map_err(|e| GitJsonError::Archive(e.to_string()))?;
            writer.write_all(bytes).map_err(|e| GitJsonError::Archive(e.to_string()))?;
        }
        writer.finish().map_err(|e| GitJsonError::Archive(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

/// Builds the archive bytes for `commit_oid`'s tree, named under
/// `<repo_name>-<short-oid>/...` (§4.H.1 "snapshot": "prefix directory").
pub fn build(reader: &dyn GitReader, commit_oid: &Oid, repo_name: &str, format: ArchiveFormat) -> Result<Vec<u8>, GitJsonError> {
    let commit = reader.read_commit(commit_oid)?;
    let entries = flatten_commit_tree(reader, &commit.tree)?;

    let mut files = Vec::with_capacity(entries.len());
    for (path, oid) in entries {
        let bytes = reader.read_blob(&oid)?;
        files.push((path, bytes));
    }

    let short_oid = &commit_oid.as_str()[..commit_oid.as_str().len().min(12)];
    let base = repo_name.trim_end_matches(".git");
    let prefix = format!("{base}-{short_oid}");

    match format {
        ArchiveFormat::TarGz => {
            let tar_bytes = build_tar(&files, &prefix)?;
            let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder
                .write_all(&tar_bytes)
                .map_err(|e| GitJsonError::Archive(e.to_string()))?;
            encoder.finish().map_err(|e| GitJsonError::Archive(e.to_string()))
        }
        ArchiveFormat::TarBz2 => {
            let tar_bytes = build_tar(&files, &prefix)?;
            let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
            encoder
                .write_all(&tar_bytes)
                .map_err(|e| GitJsonError::Archive(e.to_string()))?;
            encoder.finish().map_err(|e| GitJsonError::Archive(e.to_string()))
        }
        ArchiveFormat::TarXz => {
            let tar_bytes = build_tar(&files, &prefix)?;
            let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
            encoder
                .write_all(&tar_bytes)
                .map_err(|e| GitJsonError::Archive(e.to_string()))?;
            encoder.finish().map_err(|e| GitJsonError::Archive(e.to_string()))
        }
        ArchiveFormat::Zip => build_zip(&files, &prefix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git_reader::{BlameHunk, CommitInfo, PathResolution, RawRef, TreeEntry};
    use std::collections::HashMap;

    struct FixtureReader {
        commits: HashMap<String, CommitInfo>,
        trees: HashMap<String, Vec<TreeEntry>>,
        blobs: HashMap<String, Vec<u8>>,
    }

    impl GitReader for FixtureReader {
        fn list_refs(&self) -> Result<Vec<RawRef>, GitJsonError> {
            Ok(vec![])
        }
        fn resolve(&self, spec: &str) -> Result<Oid, GitJsonError> {
            Ok(Oid::from(spec.to_string()))
        }
        fn read_commit(&self, oid: &Oid) -> Result<CommitInfo, GitJsonError> {
            self.commits.get(oid.as_str()).cloned().ok_or_else(|| GitJsonError::BackingStore("missing".into()))
        }
        fn walk_first_parent(&self, _oid: &Oid, _count: usize) -> Result<Vec<CommitInfo>, GitJsonError> {
            unimplemented!()
        }
        fn read_tree(&self, oid: &Oid) -> Result<Vec<TreeEntry>, GitJsonError> {
            Ok(self.trees.get(oid.as_str()).cloned().unwrap_or_default())
        }
        fn resolve_path(&self, _c: &Oid, _s: &str) -> Result<PathResolution, GitJsonError> {
            unimplemented!()
        }
        fn read_blob(&self, oid: &Oid) -> Result<Vec<u8>, GitJsonError> {
            Ok(self.blobs.get(oid.as_str()).cloned().unwrap_or_default())
        }
        fn blame(&self, _c: &Oid, _p: &str) -> Result<Vec<BlameHunk>, GitJsonError> {
            unimplemented!()
        }
    }

    fn fixture() -> FixtureReader {
        let mut commits = HashMap::new();
        commits.insert(
            "c1".to_string(),
            CommitInfo {
                oid: Oid::from("c1"),
                tree: Oid::from("t1"),
                parents: vec![],
                author_name: "a".into(),
                author_email: "a@example.com".into(),
                author_time: 1,
                committer_name: "a".into(),
                committer_email: "a@example.com".into(),
                committer_time: 1,
                summary: "init".into(),
                body: String::new(),
            },
        );
        let mut trees = HashMap::new();
        trees.insert(
            "t1".to_string(),
            vec![TreeEntry {
                name: "a.txt".into(),
                mode: 0o100644,
                oid: Oid::from("b1"),
                size: None,
            }],
        );
        let mut blobs = HashMap::new();
        blobs.insert("b1".to_string(), b"hello\n".to_vec());
        FixtureReader { commits, trees, blobs }
    }

    #[test]
    fn tar_gz_has_nonempty_gzip_magic() {
        let reader = fixture();
        let bytes = build(&reader, &Oid::from("c1"), "repo.git", ArchiveFormat::TarGz).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn zip_has_local_file_header_magic() {
        let reader = fixture();
        let bytes = build(&reader, &Oid::from("c1"), "repo.git", ArchiveFormat::Zip).unwrap();
        assert_eq!(&bytes[..4], b"PK\x03\x04");
    }

    #[test]
    fn format_suffix_and_content_type_are_consistent() {
        assert_eq!(ArchiveFormat::TarBz2.suffix(), "tar.bz2");
        assert_eq!(ArchiveFormat::Zip.content_type(), "application/zip");
    }
}
