//! Hashing primitives: the pluggable MD5 capability used for fingerprints
//! and identity hashing (§9 "Optional MD5 implementation"), and the
//! `Fingerprint` / `Oid` newtypes used throughout the cache and job layers.
//!
//! The MD5 implementation is a capability, not a hard dependency: the core
//! never assumes a specific crate, only the four operations the original
//! C API exposed (`alloc`/`init`/`update`/`finalize`). `DefaultMd5Context`
//! wraps the `md-5` crate; a host can substitute an accelerated
//! implementation by supplying its own `Md5Context` impl in
//! `VhostConfig::md5_impl`.

use std::fmt::{self, Display};
use std::str::FromStr;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

/// One MD5 hashing session. `init` resets state for reuse, mirroring the
/// original C API's "`md5_fini` does not free the context" contract.
pub trait Md5Context: Send {
    fn init(&mut self);
    fn update(&mut self, input: &[u8]);
    fn finalize(&mut self) -> [u8; 16];
}

/// Default, pure-Rust MD5 context backed by the `md-5` crate.
#[derive(Default)]
pub struct DefaultMd5Context(Md5);

impl Md5Context for DefaultMd5Context {
    fn init(&mut self) {
        self.0 = Md5::new();
    }

    fn update(&mut self, input: &[u8]) {
        Digest::update(&mut self.0, input);
    }

    fn finalize(&mut self) -> [u8; 16] {
        let digest = std::mem::take(&mut self.0).finalize();
        let mut out = [0u8; 16];
        out.copy_from_slice(&digest);
        out
    }
}

/// Factory for `Md5Context` instances, selected at vhost creation.
pub type Md5Alloc = std::sync::Arc<dyn Fn() -> Box<dyn Md5Context> + Send + Sync>;

/// The pluggable MD5 implementation bound to a vhost.
#[derive(Clone)]
pub struct Md5Impl {
    alloc: Md5Alloc,
}

impl Md5Impl {
    pub fn new(alloc: Md5Alloc) -> Self {
        Self { alloc }
    }

    pub fn context(&self) -> Box<dyn Md5Context> {
        (self.alloc)()
    }

    /// One-shot convenience: hash a single buffer.
    pub fn digest(&self, input: &[u8]) -> [u8; 16] {
        let mut ctx = self.context();
        ctx.init();
        ctx.update(input);
        ctx.finalize()
    }
}

impl Default for Md5Impl {
    fn default() -> Self {
        Self::new(std::sync::Arc::new(|| {
            Box::<DefaultMd5Context>::default() as Box<dyn Md5Context>
        }))
    }
}

/// A 16-byte MD5 fingerprint: the cache key and ETag value (§3, §4.G).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 16]);

impl Fingerprint {
    pub fn from_bytes(b: [u8; 16]) -> Self {
        Self(b)
    }

    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First two hex characters, used for the two-level disk-cache shard
    /// path (`base/<hex0>/<hex1>/<hex32>`).
    pub fn shard(&self) -> (char, char) {
        let h = self.hex();
        let mut chars = h.chars();
        (chars.next().unwrap(), chars.next().unwrap())
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.hex())
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 {
            return Err(format!("fingerprint must be 32 hex chars, got {}", s.len()));
        }
        let bytes = hex::decode(s).map_err(|e| e.to_string())?;
        let mut out = [0u8; 16];
        out.copy_from_slice(&bytes);
        Ok(Fingerprint(out))
    }
}

/// An opaque git object id, as produced by the pluggable `git_reader`
/// capability (§6). gitjson-core never interprets the hash algorithm
/// behind it; it only needs equality, ordering, hex round-tripping, and
/// the first byte (used as the ref-by-oid hash bucket, §3 "Ref").
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Oid(pub String);

impl Oid {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw bytes, decoded from the hex representation. Used to feed the
    /// repo fingerprint MD5 (§4.D invariant 3).
    pub fn raw_bytes(&self) -> Vec<u8> {
        hex::decode(&self.0).unwrap_or_default()
    }

    /// Bucket index (0..=255) for the "hashed by first byte of oid" ref
    /// lookup table (§3 "Ref").
    pub fn bucket(&self) -> u8 {
        self.raw_bytes().first().copied().unwrap_or(0)
    }
}

impl Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self.0)
    }
}

impl From<String> for Oid {
    fn from(s: String) -> Self {
        Oid(s)
    }
}

impl From<&str> for Oid {
    fn from(s: &str) -> Self {
        Oid(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_roundtrips_hex() {
        let fp = Fingerprint([7u8; 16]);
        let hex = fp.hex();
        let parsed: Fingerprint = hex.parse().unwrap();
        assert_eq!(fp, parsed);
    }

    #[test]
    fn fingerprint_shard_is_first_two_chars() {
        let fp: Fingerprint = "abcd1234abcd1234abcd1234abcd1234".parse().unwrap();
        assert_eq!(fp.shard(), ('a', 'b'));
    }

    #[test]
    fn md5_default_matches_known_vector() {
        let md5 = Md5Impl::default();
        let digest = md5.digest(b"");
        assert_eq!(hex::encode(digest), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn oid_bucket_is_first_byte() {
        let oid: Oid = "ff00112233445566778899aabbccddeeff00112".into();
        assert_eq!(oid.bucket(), 0xff);
    }
}
