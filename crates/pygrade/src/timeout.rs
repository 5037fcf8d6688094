//! Timeout guard for worker-thread replies.
//!
//! The VM worker owned by an [`Environment`](crate::Environment) is not `Send`,
//! so the caller never runs candidate code on its own thread. Instead it sends
//! a command to the worker and waits on a reply channel through
//! [`await_with_deadline`]. When the deadline passes the caller simply stops
//! waiting: the worker is abandoned mid-computation and later replaced with a
//! fresh interpreter. This preempts CPU-bound infinite loops (busy-waiting
//! included) without any cooperation from the candidate code.
//!
//! # Why no SIGALRM / process::exit
//! SIGALRM is not thread-safe on Linux with multi-threading. process::exit
//! kills all threads including the caller. Thread abandonment is the only
//! portable, safe mechanism for interrupting a tight Python loop that never
//! yields.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

/// What happened while waiting for a worker reply.
#[derive(Debug, PartialEq, Eq)]
pub enum GuardOutcome<T> {
    /// The worker replied within the deadline.
    Finished(T),
    /// The deadline elapsed first. The worker is still running and must be
    /// treated as lost; any side effects it already committed remain.
    TimedOut,
    /// The sender was dropped without replying (worker thread panicked or
    /// exited). Distinct from a timeout so callers can report it differently.
    Disconnected,
}

/// Wait at most `timeout` for a value on `rx`.
///
/// # Abandonment guarantee
/// On [`GuardOutcome::TimedOut`] the worker holds no references to data the
/// caller owns exclusively; shared buffers are reference-counted and the
/// worker's clones are dropped whenever it eventually finishes or the process
/// exits.
pub fn await_with_deadline<T>(rx: &Receiver<T>, timeout: Duration) -> GuardOutcome<T> {
    match rx.recv_timeout(timeout) {
        Ok(value) => GuardOutcome::Finished(value),
        Err(RecvTimeoutError::Timeout) => GuardOutcome::TimedOut,
        Err(RecvTimeoutError::Disconnected) => GuardOutcome::Disconnected,
    }
}
