//! Foundational public types for the pygrade library.
//!
//! This module defines the core data structures used throughout the library:
//! - [`EngineSettings`] — configuration for an execution engine instance
//! - [`ExecuteResult`] — the aggregate grading verdict for one candidate
//! - [`ExecError`] — structured error variants for a single guarded execution
//! - [`DEFAULT_TIMEOUT`] — the per-test wall-clock budget used when callers
//!   have no reason to pick another one

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default wall-clock budget for a single guarded execution: 5 seconds.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration that governs the environments an [`Engine`](crate::Engine)
/// creates. The per-test timeout is deliberately *not* here — it is a per-call
/// parameter of `execute`/`evaluate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Maximum number of bytes that may be written to stdout + stderr combined
    /// during one test run. Default: 1,048,576 bytes (1 MiB).
    pub max_output_bytes: usize,

    /// Maximum number of compiled code objects kept per environment worker.
    /// Default: 64.
    pub code_cache_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_output_bytes: 1_048_576,
            code_cache_capacity: 64,
        }
    }
}

/// The aggregate verdict for one candidate function against one test list.
///
/// Immutable after construction. `outcomes` is aligned with the input test
/// order: `outcomes[i]` is `true` iff `tests[i]` succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResult {
    /// `true` iff every test succeeded.
    pub passed: bool,

    /// Two-section report: "Tests passed:" lines, a blank line, then
    /// "Tests failed:" lines of the form `<test> # output: <diagnosis>`.
    pub feedback: String,

    /// One entry per input test, same order as the input list.
    pub outcomes: Vec<bool>,
}

/// Structured error variants produced when a guarded execution fails.
///
/// Serialized with an internally-tagged `"type"` discriminator field so that
/// JSON consumers can switch on `error.type` without a wrapper object.
///
/// # Examples (JSON)
/// ```json
/// {"type":"SyntaxError","message":"invalid syntax","line":1,"col":5}
/// {"type":"RuntimeError","message":"division by zero","traceback":"..."}
/// {"type":"Timeout","limit_ns":5000000000}
/// {"type":"SystemExit"}
/// {"type":"Interrupted"}
/// {"type":"OutputLimitExceeded","limit_bytes":1048576}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecError {
    /// The Python source could not be parsed.
    SyntaxError {
        /// Human-readable description of the parse error.
        message: String,
        /// 1-based line number of the error, or 0 if unknown.
        line: u32,
        /// 1-based column number of the error, or 0 if unknown.
        col: u32,
    },

    /// A Python exception was raised during execution or evaluation.
    RuntimeError {
        /// The exception message (e.g. `"division by zero"`).
        message: String,
        /// Python-formatted traceback string, or empty if unavailable.
        traceback: String,
    },

    /// The guarded execution exceeded its wall-clock budget.
    Timeout {
        /// The timeout limit that was exceeded, in nanoseconds.
        limit_ns: u64,
    },

    /// Candidate code raised `SystemExit` (explicit process-exit request).
    /// Rendered during diagnosis as `"System exit requested."` because the
    /// native message is uninformative.
    SystemExit,

    /// Candidate code raised `KeyboardInterrupt`. Rendered during diagnosis
    /// as `"Execution interrupted by user."`.
    Interrupted,

    /// Combined stdout + stderr output exceeded
    /// [`EngineSettings::max_output_bytes`].
    OutputLimitExceeded {
        /// The output limit that was exceeded, in bytes.
        limit_bytes: usize,
    },
}
