//! Thread-safe output capture buffer for the pygrade library.
//!
//! [`OutputBuffer`] accumulates bytes written to stdout and stderr while
//! candidate code runs, enforcing a combined byte limit. The buffer is shared
//! between the engine thread (which reads after execution) and the VM worker
//! (which writes during execution) via `Arc<Mutex<_>>` interior mutability —
//! no `unsafe` code required.
//!
//! # Timeout path
//!
//! When the VM worker is abandoned on timeout, it may still hold a clone of
//! the `OutputBuffer`. [`take_strings`](OutputBuffer::take_strings) therefore
//! never consumes the handle: it locks, drains the accumulated bytes, and
//! leaves the buffer empty for the next run.

use std::sync::{Arc, Mutex};

use crate::types::ExecError;

// ── Inner state ───────────────────────────────────────────────────────────────

struct OutputBufferInner {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    max_bytes: usize,
    limit_exceeded: bool,
}

impl OutputBufferInner {
    fn new(max_bytes: usize) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            max_bytes,
            limit_exceeded: false,
        }
    }

    /// Returns the combined number of bytes written so far.
    fn total_len(&self) -> usize {
        self.stdout.len() + self.stderr.len()
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// A thread-safe buffer that captures VM stdout and stderr output.
///
/// Cheap to clone — all clones share the same underlying data via
/// `Arc<Mutex<OutputBufferInner>>`.
#[derive(Clone)]
pub struct OutputBuffer {
    inner: Arc<Mutex<OutputBufferInner>>,
}

impl OutputBuffer {
    /// Creates a new `OutputBuffer` that will accept up to `max_bytes` combined
    /// across stdout and stderr.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(OutputBufferInner::new(max_bytes))),
        }
    }

    /// Appends `data` to the stdout stream.
    ///
    /// Returns `Err(ExecError::OutputLimitExceeded { limit_bytes })` if
    /// accepting `data` would push the combined stdout+stderr total over
    /// `max_bytes`. On error the buffer state is *not* modified and
    /// `is_limit_exceeded()` is set to `true`.
    pub fn write_stdout(&self, data: &[u8]) -> Result<(), ExecError> {
        let mut inner = self.inner.lock().expect("OutputBuffer mutex poisoned");
        if inner.total_len() + data.len() > inner.max_bytes {
            inner.limit_exceeded = true;
            return Err(ExecError::OutputLimitExceeded {
                limit_bytes: inner.max_bytes,
            });
        }
        inner.stdout.extend_from_slice(data);
        Ok(())
    }

    /// Appends `data` to the stderr stream.
    ///
    /// Same limit semantics as [`write_stdout`](Self::write_stdout).
    pub fn write_stderr(&self, data: &[u8]) -> Result<(), ExecError> {
        let mut inner = self.inner.lock().expect("OutputBuffer mutex poisoned");
        if inner.total_len() + data.len() > inner.max_bytes {
            inner.limit_exceeded = true;
            return Err(ExecError::OutputLimitExceeded {
                limit_bytes: inner.max_bytes,
            });
        }
        inner.stderr.extend_from_slice(data);
        Ok(())
    }

    /// Returns `true` if any write has been rejected due to the byte limit.
    pub fn is_limit_exceeded(&self) -> bool {
        let inner = self.inner.lock().expect("OutputBuffer mutex poisoned");
        inner.limit_exceeded
    }

    /// Drains the buffer and returns `(stdout, stderr)` as UTF-8 strings.
    ///
    /// Invalid UTF-8 sequences are replaced with the Unicode replacement
    /// character (`\u{FFFD}`) via [`String::from_utf8_lossy`]. The limit flag
    /// is left untouched; call [`clear`](Self::clear) to reset it.
    pub fn take_strings(&self) -> (String, String) {
        let mut inner = self.inner.lock().expect("OutputBuffer mutex poisoned");
        let stdout = std::mem::take(&mut inner.stdout);
        let stderr = std::mem::take(&mut inner.stderr);
        (
            String::from_utf8_lossy(&stdout).into_owned(),
            String::from_utf8_lossy(&stderr).into_owned(),
        )
    }

    /// Discards all buffered bytes and clears the limit flag.
    ///
    /// Called between unrelated test runs so one test's runaway output cannot
    /// poison the next one's limit accounting.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("OutputBuffer mutex poisoned");
        inner.stdout.clear();
        inner.stderr.clear();
        inner.limit_exceeded = false;
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
