//! Execution engine: grade one candidate function against a list of tests.
//!
//! This module is the top-level orchestrator for a grading run:
//! 1. For each test (in input order), combines the preamble, the candidate
//!    function, and the test assertion into one snippet and executes it into
//!    the engine's [`Environment`] under the timeout guard.
//! 2. On any failure — exception, timeout, syntax error — runs
//!    [`diagnose`](Engine::diagnose) to recover what the call under test
//!    actually produced, and records the decorated failure line.
//! 3. Resets the environment after every test, pass or fail, so no state
//!    leaks between tests.
//! 4. Aggregates the per-test results into an [`ExecuteResult`]: the scalar
//!    verdict, the two-section feedback report, and the outcome vector.
//!
//! Tests for one candidate are processed strictly in order, one at a time;
//! there is no parallelism within a single `execute` call and no retries — a
//! failed or timed-out test is recorded once.

use std::time::Duration;

use crate::env::Environment;
use crate::extract::call_expression;
use crate::types::{EngineSettings, ExecError, ExecuteResult};

/// Wildcard type-name imports prepended to every combined snippet, so
/// candidate code annotated with `List`, `Optional`, etc. runs unmodified.
const PREAMBLE: &str = "from typing import *";

/// Grades candidate Python functions against executable test assertions.
///
/// Owns one long-lived [`Environment`] for test runs; every failure diagnosis
/// gets its own fresh, fully isolated environment.
pub struct Engine {
    env: Environment,
    settings: EngineSettings,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Create an engine with default settings.
    pub fn new() -> Self {
        Self::with_settings(EngineSettings::default())
    }

    /// Create an engine with explicit settings.
    pub fn with_settings(settings: EngineSettings) -> Self {
        Self {
            env: Environment::new(&settings),
            settings,
        }
    }

    /// Grade `function` against `tests`, each bounded by `timeout`
    /// (use [`DEFAULT_TIMEOUT`](crate::DEFAULT_TIMEOUT) when in doubt).
    ///
    /// Never fails outward: every per-test error is caught, classified, and
    /// folded into the returned [`ExecuteResult`].
    pub fn execute(
        &mut self,
        function: &str,
        tests: &[String],
        timeout: Duration,
    ) -> ExecuteResult {
        let mut successes: Vec<String> = Vec::new();
        let mut failures: Vec<String> = Vec::new();

        for test in tests {
            let snippet = format!("{PREAMBLE}\n{function}\n{test}");
            match self.env.execute(&snippet, timeout) {
                Ok(()) => successes.push(test.clone()),
                Err(_) => {
                    let output = self.diagnose(function, test, timeout);
                    failures.push(format!("{test} # output: {output}"));
                }
            }
            // Unconditional: isolate subsequent tests from this one's state.
            self.env.reset();
        }

        ExecuteResult {
            passed: failures.is_empty(),
            feedback: format_feedback(&successes, &failures),
            outcomes: outcome_vector(tests, &successes),
        }
    }

    /// Recover a human-readable description of what a failing test's call
    /// actually did: its value, `"TIMEOUT"`, or an error message.
    ///
    /// Runs in a fresh environment, fully independent of whatever state the
    /// failing attempt left behind, with its own fresh timeout windows even
    /// when the original failure was itself a timeout. Never raises outward.
    fn diagnose(&self, function: &str, test: &str, timeout: Duration) -> String {
        let call = call_expression(test);
        let mut scratch = Environment::new(&self.settings);

        let outcome = scratch
            .execute(&format!("{PREAMBLE}\n{function}"), timeout)
            .and_then(|()| scratch.evaluate(&call, timeout));

        match outcome {
            Ok(value) => value,
            Err(ExecError::Timeout { .. }) => "TIMEOUT".to_string(),
            Err(ExecError::SystemExit) => "System exit requested.".to_string(),
            Err(ExecError::Interrupted) => "Execution interrupted by user.".to_string(),
            Err(ExecError::SyntaxError { message, .. }) => message,
            Err(ExecError::RuntimeError { message, .. }) => message,
            Err(ExecError::OutputLimitExceeded { limit_bytes }) => {
                format!("Output limit exceeded: {limit_bytes} bytes")
            }
        }
    }

    /// Evaluate `function` against a dataset-style test suite.
    ///
    /// The suite is expected (by convention, owed by the dataset collaborator)
    /// to define a `check` routine that raises when given a wrong
    /// implementation; this method appends `check(<name>)` and returns `true`
    /// iff the whole run completes without any failure, timeout included.
    pub fn evaluate(
        &mut self,
        name: &str,
        function: &str,
        test_suite: &str,
        timeout: Duration,
    ) -> bool {
        let code = format!("{function}\n\n{test_suite}\n\ncheck({name})\n");
        let ok = self.env.execute(&code, timeout).is_ok();
        // Suite state must not leak into a later execute() on this engine.
        self.env.reset();
        ok
    }
}

// ── Aggregation helpers ──────────────────────────────────────────────────────

/// Render the fixed two-section report: succeeded tests verbatim, then the
/// decorated failure lines, in the order each was encountered.
fn format_feedback(successes: &[String], failures: &[String]) -> String {
    let mut feedback = String::from("Tests passed:");
    for test in successes {
        feedback.push('\n');
        feedback.push_str(test);
    }
    feedback.push_str("\n\nTests failed:");
    for line in failures {
        feedback.push('\n');
        feedback.push_str(line);
    }
    feedback
}

/// One boolean per input test, in input order, by membership in the success
/// set — so duplicate test strings resolve consistently.
fn outcome_vector(tests: &[String], successes: &[String]) -> Vec<bool> {
    tests
        .iter()
        .map(|test| successes.contains(test))
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
