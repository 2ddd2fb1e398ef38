//! Per-context bump allocator (§4.A "Arena").
//!
//! Every `Context` owns one arena. Job producers allocate scratch buffers
//! and small strings from it instead of the global allocator; the arena is
//! freed in one shot when the context is destroyed, and never grows once a
//! job has run (the job either fits the remaining budget or reports OOM).
//!
//! `detach` produces a reference-counted handle a value can hold onto past
//! the arena's own lifetime (e.g. a `Fingerprint` computed mid-job that a
//! later chained job still needs) without copying the backing bytes.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::errors::GitJsonError;

/// Fixed-capacity bump allocator. Not `Sync`: one arena belongs to exactly
/// one context, and a context never runs two jobs concurrently (spec §5).
pub struct Arena {
    buf: RefCell<Vec<u8>>,
    used: RefCell<usize>,
    capacity: usize,
}

impl Arena {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: RefCell::new(vec![0u8; capacity]),
            used: RefCell::new(0),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used(&self) -> usize {
        *self.used.borrow()
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.used()
    }

    /// Bump-allocate `len` zeroed bytes. Never shrinks or reuses freed
    /// space; callers that need that discipline should use a fresh
    /// `Arena` per context, which is exactly what `Context::new` does.
    pub fn alloc(&self, len: usize) -> Result<ArenaSlice<'_>, GitJsonError> {
        let mut used = self.used.borrow_mut();
        if *used + len > self.capacity {
            return Err(GitJsonError::Oom);
        }
        let start = *used;
        *used += len;
        Ok(ArenaSlice {
            arena: self,
            start,
            len,
        })
    }

    pub fn alloc_str(&self, s: &str) -> Result<ArenaSlice<'_>, GitJsonError> {
        let slice = self.alloc(s.len())?;
        self.buf.borrow_mut()[slice.start..slice.start + slice.len].copy_from_slice(s.as_bytes());
        Ok(slice)
    }

    fn read(&self, start: usize, len: usize) -> Vec<u8> {
        self.buf.borrow()[start..start + len].to_vec()
    }
}

/// A view into an `Arena`'s backing buffer, borrowed for the arena's own
/// lifetime.
pub struct ArenaSlice<'a> {
    arena: &'a Arena,
    start: usize,
    len: usize,
}

impl<'a> ArenaSlice<'a> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn write(&self, data: &[u8]) {
        debug_assert_eq!(data.len(), self.len);
        self.arena.buf.borrow_mut()[self.start..self.start + self.len].copy_from_slice(data);
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.arena.read(self.start, self.len)
    }

    /// Detaches this slice's contents into a reference-counted owned
    /// buffer that outlives the arena.
    pub fn detach(&self) -> Detached {
        Detached(Arc::new(self.to_vec()))
    }
}

/// An arena value detached past the arena's lifetime (§4.A "detach").
#[derive(Clone)]
pub struct Detached(Arc<Vec<u8>>);

impl Detached {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Reference-counted handle used when several job stages need to share one
/// arena (e.g. a chained tree→search job, §4.H "Chaining").
pub type SharedArena = Rc<Arena>;
