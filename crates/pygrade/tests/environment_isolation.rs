//! State-isolation tests for the execution environment and the engine's
//! per-test reset discipline.
//!
//! The environment has no process/thread sandbox; clearing the namespace is
//! the only isolation boundary. These tests verify that boundary holds both
//! at the environment level (explicit reset) and at the engine level (a test
//! that mutates a global must not affect a subsequent unrelated test).
//!
//! Run with: `cargo test -p pygrade --test environment_isolation`

use std::time::Duration;

use pygrade::{Engine, EngineSettings, Environment, ExecError, DEFAULT_TIMEOUT};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Bindings accumulate across execute/evaluate calls, then vanish on reset.
#[test]
fn test_reset_clears_bindings() {
    let mut env = Environment::new(&EngineSettings::default());

    env.execute("marker = 42", DEFAULT_TIMEOUT).expect("exec failed");
    assert_eq!(env.evaluate("marker", DEFAULT_TIMEOUT), Ok("42".to_string()));

    env.reset();

    let after = env.evaluate("marker", DEFAULT_TIMEOUT);
    assert!(
        matches!(after, Err(ExecError::RuntimeError { ref message, .. }) if message.contains("marker")),
        "expected NameError mentioning 'marker', got {:?}",
        after
    );
}

/// A timed-out environment is replaced with a clean one: nothing defined
/// before the timeout survives.
#[test]
fn test_timeout_discards_namespace() {
    let mut env = Environment::new(&EngineSettings::default());

    env.execute("survivor = 'should not'", DEFAULT_TIMEOUT)
        .expect("exec failed");
    let timed_out = env.execute("while True: pass", Duration::from_millis(200));
    assert!(matches!(timed_out, Err(ExecError::Timeout { .. })));

    assert!(
        env.evaluate("survivor", DEFAULT_TIMEOUT).is_err(),
        "bindings must not survive worker replacement"
    );
}

/// Engine-level: test 1 mutates a module-level global through the candidate;
/// test 2 reads that global directly and must fail because the engine reset
/// the namespace in between.
#[test]
fn test_global_mutation_does_not_leak_between_tests() {
    let function = "leaked = 0\ndef poison():\n    global leaked\n    leaked = 1\n    return 1";
    let tests = strings(&["assert poison() == 1", "assert leaked == 1"]);

    let mut engine = Engine::new();
    let result = engine.execute(function, &tests, DEFAULT_TIMEOUT);

    // Test 2 re-runs the function source, which resets `leaked` to 0 in a
    // fresh namespace; if state leaked from test 1 it would wrongly pass.
    assert_eq!(result.outcomes, vec![true, false]);
}

/// A failing (and diagnosed) test must not disturb the verdict of the test
/// after it.
#[test]
fn test_failure_then_success_in_order() {
    let mut engine = Engine::new();
    let result = engine.execute(
        "def add(a, b):\n    return a + b",
        &strings(&["assert add(1, 1) == 3", "assert add(1, 1) == 2"]),
        DEFAULT_TIMEOUT,
    );

    assert_eq!(result.outcomes, vec![false, true]);
    assert!(!result.passed);
    assert!(result.feedback.contains("Tests passed:\nassert add(1, 1) == 2"));
}

/// evaluate() must not leak suite state into a later execute() on the same
/// engine.
#[test]
fn test_evaluate_does_not_leak_into_execute() {
    let mut engine = Engine::new();

    let ok = engine.evaluate(
        "identity",
        "def identity(x):\n    return x",
        "def check(candidate):\n    assert candidate(5) == 5",
        DEFAULT_TIMEOUT,
    );
    assert!(ok);

    // `check` was defined by the suite; a following test referencing it must
    // fail, proving the reset happened.
    let result = engine.execute(
        "def identity(x):\n    return x",
        &strings(&["assert check(identity) is None"]),
        DEFAULT_TIMEOUT,
    );
    assert_eq!(result.outcomes, vec![false]);
}
