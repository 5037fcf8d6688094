//! Execution environment — a persistent Python namespace behind a worker thread.
//!
//! ## Design
//!
//! An [`Environment`] owns one dedicated OS thread that:
//! 1. Initializes a RustPython `Interpreter` and a builtins `Scope` at startup.
//! 2. Blocks on a `Receiver<Request>` channel.
//! 3. On each request: executes/evaluates against the persistent scope and
//!    sends the result back via the request's one-shot reply channel.
//! 4. The interpreter NEVER crosses thread boundaries — this is the key
//!    invariant required because RustPython's VM types are not `Send`.
//!
//! The caller waits for every reply through the timeout guard. When a reply
//! does not arrive in time the worker is abandoned: the environment drops its
//! sender and lazily spawns a replacement worker (fresh interpreter, empty
//! namespace) on the next request. The abandoned thread notices its channels
//! are disconnected when it eventually finishes and exits on its own.
//!
//! ## Isolation discipline
//!
//! The namespace deliberately accumulates definitions across `execute` calls —
//! that is what lets a function definition and a test assertion, or a function
//! and a later diagnostic call, see each other. [`reset`](Environment::reset)
//! is the isolation boundary: it replaces the scope with a fresh one and must
//! be called between unrelated test runs. There is no process/thread sandbox;
//! namespace clearing is the only isolation this harness provides.
//!
//! ## Zero unsafe blocks
//!
//! All concurrency uses safe Rust APIs (`mpsc`, `Arc`, `Mutex`).

use std::sync::mpsc;
use std::time::Duration;

use crate::cache::CodeCache;
use crate::output::OutputBuffer;
use crate::timeout::{await_with_deadline, GuardOutcome};
use crate::types::{EngineSettings, ExecError};
use crate::vm::{build_interpreter, eval_in_scope, exec_in_scope, install_output_capture};

/// Budget for namespace resets. A reset runs no candidate code, so this only
/// trips if the worker is already wedged by an earlier run.
const RESET_TIMEOUT: Duration = Duration::from_secs(5);

// ── Worker protocol ──────────────────────────────────────────────────────────

/// A command sent from the environment handle to its worker thread.
///
/// All fields are `Send` — this is what crosses the thread boundary. The
/// interpreter, scope, and code cache stay on the worker.
enum Request {
    /// Compile and run statements into the persistent scope.
    Exec {
        source: String,
        reply: mpsc::SyncSender<Result<(), ExecError>>,
    },
    /// Evaluate a single expression and render its value as text.
    Eval {
        expr: String,
        reply: mpsc::SyncSender<Result<String, ExecError>>,
    },
    /// Replace the scope with a fresh builtins scope.
    Reset { reply: mpsc::SyncSender<()> },
}

/// Spawn a worker thread owning one interpreter, one scope, and one code cache.
///
/// Returns the request sender. The worker exits when every sender is dropped
/// (or, after abandonment, when its next reply fails and the channel is gone).
fn spawn_worker(
    output: OutputBuffer,
    max_output_bytes: usize,
    cache_capacity: usize,
) -> mpsc::Sender<Request> {
    let (tx, rx) = mpsc::channel::<Request>();

    std::thread::Builder::new()
        .name("pygrade-env".to_string())
        .spawn(move || {
            let interp = build_interpreter();
            let mut scope = interp.enter(|vm| vm.new_scope_with_builtins());
            let mut cache = CodeCache::new(cache_capacity);

            while let Ok(request) = rx.recv() {
                match request {
                    Request::Exec { source, reply } => {
                        let mut result = interp.enter(|vm| {
                            install_output_capture(vm, output.clone());
                            exec_in_scope(vm, &scope, &source, &mut cache)
                        });
                        // A rejected write surfaced as a Python RuntimeError
                        // inside the run; canonicalize it.
                        if output.is_limit_exceeded() {
                            result = Err(ExecError::OutputLimitExceeded {
                                limit_bytes: max_output_bytes,
                            });
                        }
                        // If the caller timed out meanwhile, the reply channel
                        // is disconnected; discard and keep serving.
                        let _ = reply.send(result);
                    }
                    Request::Eval { expr, reply } => {
                        let mut result = interp.enter(|vm| {
                            install_output_capture(vm, output.clone());
                            eval_in_scope(vm, &scope, &expr)
                        });
                        if output.is_limit_exceeded() {
                            result = Err(ExecError::OutputLimitExceeded {
                                limit_bytes: max_output_bytes,
                            });
                        }
                        let _ = reply.send(result);
                    }
                    Request::Reset { reply } => {
                        scope = interp.enter(|vm| vm.new_scope_with_builtins());
                        let _ = reply.send(());
                    }
                }
            }
        })
        .expect("Failed to spawn environment worker thread");

    tx
}

// ── Environment ──────────────────────────────────────────────────────────────

/// A mutable Python namespace that accumulates definitions as code is executed
/// into it, with explicit [`reset`](Self::reset) as the isolation boundary.
///
/// Created once per [`Engine`](crate::Engine) instance (plus one fresh
/// instance per failure diagnosis); destroyed with it.
pub struct Environment {
    /// `None` after a timeout/worker death — the next request respawns.
    tx: Option<mpsc::Sender<Request>>,
    output: OutputBuffer,
    max_output_bytes: usize,
    cache_capacity: usize,
}

impl Environment {
    /// Create an environment and eagerly spawn its worker.
    pub fn new(settings: &EngineSettings) -> Self {
        let output = OutputBuffer::new(settings.max_output_bytes);
        let tx = spawn_worker(
            output.clone(),
            settings.max_output_bytes,
            settings.code_cache_capacity,
        );
        Self {
            tx: Some(tx),
            output,
            max_output_bytes: settings.max_output_bytes,
            cache_capacity: settings.code_cache_capacity,
        }
    }

    /// Compile and run `source` inside the shared namespace, bounded by
    /// `timeout`. Definitions persist into the namespace.
    ///
    /// On timeout the worker is abandoned and any partial side effects it
    /// already committed are lost with it (no rollback, no reuse).
    pub fn execute(&mut self, source: &str, timeout: Duration) -> Result<(), ExecError> {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.send(Request::Exec {
            source: source.to_owned(),
            reply: reply_tx,
        })?;
        self.await_reply(&reply_rx, timeout)?
    }

    /// Evaluate a single expression against the current namespace and return
    /// its resulting value rendered as text.
    pub fn evaluate(&mut self, expr: &str, timeout: Duration) -> Result<String, ExecError> {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.send(Request::Eval {
            expr: expr.to_owned(),
            reply: reply_tx,
        })?;
        self.await_reply(&reply_rx, timeout)?
    }

    /// Discard all accumulated bindings, returning the namespace to its
    /// initial empty state, and drop any captured output.
    ///
    /// Must be called between unrelated test runs so that failures or side
    /// effects in one test cannot mask or alter the outcome of another. A
    /// poisoned environment is already clean: its replacement worker starts
    /// with a fresh namespace.
    pub fn reset(&mut self) {
        self.output.clear();

        let Some(tx) = &self.tx else {
            return;
        };
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        if tx.send(Request::Reset { reply: reply_tx }).is_err() {
            self.tx = None;
            return;
        }
        if !matches!(
            await_with_deadline(&reply_rx, RESET_TIMEOUT),
            GuardOutcome::Finished(())
        ) {
            self.tx = None;
        }
    }

    /// Drain everything the candidate wrote to stdout/stderr since the last
    /// reset (UTF-8, lossy).
    pub fn take_output(&mut self) -> (String, String) {
        self.output.take_strings()
    }

    // ── Internals ────────────────────────────────────────────────────────────

    /// Send a request, respawning the worker first if it was abandoned.
    fn send(&mut self, request: Request) -> Result<(), ExecError> {
        if self.tx.is_none() {
            self.output = OutputBuffer::new(self.max_output_bytes);
        }
        let output = self.output.clone();
        let (max_output_bytes, cache_capacity) = (self.max_output_bytes, self.cache_capacity);
        let tx = self
            .tx
            .get_or_insert_with(|| spawn_worker(output, max_output_bytes, cache_capacity));
        if tx.send(request).is_err() {
            self.tx = None;
            return Err(worker_lost());
        }
        Ok(())
    }

    /// Wait for the worker's reply under the timeout guard, poisoning the
    /// environment on timeout or worker death.
    fn await_reply<T>(
        &mut self,
        reply_rx: &mpsc::Receiver<T>,
        timeout: Duration,
    ) -> Result<T, ExecError> {
        match await_with_deadline(reply_rx, timeout) {
            GuardOutcome::Finished(result) => Ok(result),
            GuardOutcome::TimedOut => {
                self.tx = None;
                Err(ExecError::Timeout {
                    limit_ns: timeout.as_nanos() as u64,
                })
            }
            GuardOutcome::Disconnected => {
                self.tx = None;
                Err(worker_lost())
            }
        }
    }
}

fn worker_lost() -> ExecError {
    ExecError::RuntimeError {
        message: "execution worker terminated unexpectedly".to_owned(),
        traceback: String::new(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
