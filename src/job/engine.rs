//! Job engine framework (§4.H): producer contract and epilogue sealing.
//!
//! Every producer in this crate builds its JSON artifact eagerly into an
//! in-memory buffer (the underlying git reads and string formatting are
//! already bounded per request) and is streamed out through
//! `BufferedProducer`, which is the one place that honors the "fill as
//! much of the caller buffer as fits" contract. This keeps the
//! interesting per-job logic (§4.H.1–4.H.4) free of buffer-chunking
//! concerns while still presenting the real producer contract — `start`,
//! `step`, `destroy`, `destroy_while_running` — to the context state
//! machine, and still honoring the boundary guarantee that
//! `context_fill` is correct for any caller buffer size (§8 "Boundaries").

use crate::errors::GitJsonError;

/// Reserved tail margin subtracted from every JSON-phase write decision
/// for the closing epilogue (§4.H "JSON ... reserved tail margin (100
/// bytes)"). `BufferedProducer` doesn't need to hold this back itself
/// (the epilogue is already part of the precomputed buffer) but the
/// constant is kept here as the contract's name and used by callers that
/// want to reason about worst-case remaining space.
pub const RESERVE_SEAL: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOutcome {
    pub bytes_written: usize,
    pub final_chunk: bool,
}

/// The producer contract (§4.H "Producer contract").
pub trait Producer: Send {
    fn start(&mut self) -> Result<(), GitJsonError> {
        Ok(())
    }

    /// Fills as much of `buf` as fits; returns bytes written and whether
    /// this call emitted the last byte of the artifact.
    fn step(&mut self, buf: &mut [u8]) -> Result<StepOutcome, GitJsonError>;

    /// Release on any normal exit.
    fn destroy(&mut self) {}

    /// Called when the host abandons the context mid-stream (§5
    /// "Cancellation"); must release partially built resources promptly.
    fn destroy_while_running(&mut self) {
        self.destroy();
    }
}

/// Streams a precomputed byte buffer out in caller-sized chunks,
/// idempotent-safe to re-enter (the cursor is the only mutable state).
pub struct BufferedProducer {
    data: Vec<u8>,
    cursor: usize,
}

impl BufferedProducer {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, cursor: 0 }
    }

    pub fn total_len(&self) -> usize {
        self.data.len()
    }
}

impl Producer for BufferedProducer {
    fn step(&mut self, buf: &mut [u8]) -> Result<StepOutcome, GitJsonError> {
        let remaining = &self.data[self.cursor..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.cursor += n;
        Ok(StepOutcome {
            bytes_written: n,
            final_chunk: self.cursor >= self.data.len(),
        })
    }
}
