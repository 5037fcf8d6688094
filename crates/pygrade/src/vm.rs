//! RustPython VM lifecycle for the pygrade library.
//!
//! This module owns all RustPython API calls. It:
//! - Creates interpreters with stdlib support for the environment workers.
//! - Compiles and executes candidate source into a persistent [`Scope`],
//!   compiling through the per-worker [`CodeCache`].
//! - Evaluates single expressions and renders their values as text.
//! - Classifies raised exceptions into [`ExecError`] variants, distinguishing
//!   interrupt-class conditions (`SystemExit`, `KeyboardInterrupt`) whose
//!   native messages are uninformative.
//!
//! ## Output Capture
//!
//! We replace `sys.stdout` and `sys.stderr` with minimal Python-level objects
//! whose `write(s)` method delegates to [`OutputBuffer::write_stdout`] /
//! [`OutputBuffer::write_stderr`]. The replacement happens at the start of
//! each guarded execution (inside `enter()`), so candidate prints never reach
//! the harness process streams. A rejected write surfaces in Python as a
//! `RuntimeError`; the environment worker canonicalizes it afterwards.
//!
//! ## Zero unsafe blocks
//!
//! This file contains no `unsafe` code. All RustPython integration uses the
//! safe public Rust API.

use std::sync::{Arc, Mutex};

use rustpython_vm::{
    builtins::{PyBaseExceptionRef, PyCode},
    compiler::Mode,
    function::FuncArgs,
    scope::Scope,
    AsObject, Interpreter, PyObjectRef, PyRef, PyResult, VirtualMachine,
};

use crate::cache::{cache_key, CodeCache};
use crate::output::OutputBuffer;
use crate::types::ExecError;

/// Compiled code objects never leave their worker thread.
pub(crate) type CompiledCache = CodeCache<PyRef<PyCode>>;

// ── Interpreter construction ─────────────────────────────────────────────────

/// Create a new RustPython interpreter with stdlib configured.
///
/// The full standard library is embedded: `rustpython_stdlib` supplies the
/// native (Rust-implemented) modules, and `rustpython_pylib::FROZEN_STDLIB`
/// supplies the pure-Python modules (`typing`, `collections`, ...) compiled
/// into the binary. `sys.path` stays empty on purpose: a host CPython
/// installation must never shadow the frozen modules with incompatible
/// sources, so imports resolve against the frozen table only.
///
/// Output capture is installed at the beginning of each guarded execution
/// (inside `enter()`), not here, so every run starts with a clean hook state.
pub(crate) fn build_interpreter() -> Interpreter {
    let settings = rustpython_vm::Settings::default();

    Interpreter::with_init(settings, |vm| {
        // Native stdlib modules first: _json, math, unicodedata, zlib, etc.
        vm.add_native_modules(rustpython_stdlib::get_module_inits());
        // Then the frozen pure-Python stdlib on top of them.
        vm.add_frozen(rustpython_pylib::FROZEN_STDLIB);
    })
}

// ── Exec / Eval against a persistent scope ───────────────────────────────────

/// Compile `source` in Exec mode (through the cache) and run it into `scope`.
///
/// Definitions (functions, variables) persist in the scope across calls.
pub(crate) fn exec_in_scope(
    vm: &VirtualMachine,
    scope: &Scope,
    source: &str,
    cache: &mut CompiledCache,
) -> Result<(), ExecError> {
    let key = cache_key(source);
    let code = match cache.get(&key) {
        Some(code) => code,
        None => {
            let code = vm
                .compile(source, Mode::Exec, "<candidate>".to_owned())
                .map_err(extract_syntax_error)?;
            cache.insert(key, code.clone());
            code
        }
    };

    vm.run_code_obj(code, scope.clone())
        .map(|_| ())
        .map_err(|exc| classify_exception(vm, exc))
}

/// Compile `expr` in Eval mode, run it against `scope`, and render the
/// resulting value as text (`str()`, matching how the value would appear in a
/// feedback line — not `repr()`).
pub(crate) fn eval_in_scope(
    vm: &VirtualMachine,
    scope: &Scope,
    expr: &str,
) -> Result<String, ExecError> {
    let code = vm
        .compile(expr, Mode::Eval, "<call>".to_owned())
        .map_err(extract_syntax_error)?;

    let value = vm
        .run_code_obj(code, scope.clone())
        .map_err(|exc| classify_exception(vm, exc))?;

    value
        .str(vm)
        .map(|s| s.as_str().to_owned())
        .map_err(|exc| classify_exception(vm, exc))
}

// ── Output capture ───────────────────────────────────────────────────────────

/// Replace `sys.stdout` and `sys.stderr` with write-capturing objects.
///
/// RustPython's `print()` calls `sys.stdout.write(s)` then
/// `sys.stdout.write('\n')`, so this captures all print output.
pub(crate) fn install_output_capture(vm: &VirtualMachine, output: OutputBuffer) {
    let stdout_obj = build_writer_object(vm, output.clone(), true);
    let stderr_obj = build_writer_object(vm, output, false);

    let _ = vm.sys_module.set_attr("stdout", stdout_obj, vm);
    let _ = vm.sys_module.set_attr("stderr", stderr_obj, vm);
}

/// Build a minimal Python object with `write(s)` and `flush()` methods.
///
/// When Python calls `obj.write(s)`, the Rust closure appends to the
/// `OutputBuffer`; a rejected write (byte limit) raises a Python
/// `RuntimeError` so runaway printing aborts the candidate run.
fn build_writer_object(vm: &VirtualMachine, output: OutputBuffer, is_stdout: bool) -> PyObjectRef {
    let output = Arc::new(Mutex::new(output));
    let output_clone = Arc::clone(&output);

    let write_fn = vm.new_function(
        "write",
        move |args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
            let data: String = args
                .args
                .first()
                .and_then(|o| o.str(vm).ok())
                .map(|s| s.as_str().to_owned())
                .unwrap_or_default();

            let buf = output.lock().expect("OutputBuffer mutex poisoned");
            let write_result = if is_stdout {
                buf.write_stdout(data.as_bytes())
            } else {
                buf.write_stderr(data.as_bytes())
            };

            match write_result {
                Ok(()) => Ok(vm.ctx.new_int(data.len()).into()),
                Err(ExecError::OutputLimitExceeded { limit_bytes }) => {
                    Err(vm.new_exception_msg(
                        vm.ctx.exceptions.runtime_error.to_owned(),
                        format!("Output limit exceeded: {limit_bytes} bytes"),
                    ))
                }
                Err(_) => Err(vm.new_runtime_error("Write error".to_owned())),
            }
        },
    );

    let flush_fn = vm.new_function(
        "flush",
        move |_args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
            // Keep output_clone alive (ensures the buffer Arc stays valid).
            let _buf = output_clone.lock().expect("OutputBuffer mutex poisoned");
            Ok(vm.ctx.none())
        },
    );

    // Use a Python module as a simple namespace — it supports get_attr/set_attr
    // and is writable. Some Python code checks .closed and .encoding.
    let ns = vm.new_module("<writer>", vm.ctx.new_dict(), None);
    let _ = ns.set_attr("write", write_fn, vm);
    let _ = ns.set_attr("flush", flush_fn, vm);
    let _ = ns.set_attr("closed", vm.ctx.new_bool(false), vm);
    let _ = ns.set_attr("encoding", vm.ctx.new_str("utf-8"), vm);
    ns.into()
}

// ── Error extraction ─────────────────────────────────────────────────────────

/// Convert a RustPython compile error into [`ExecError::SyntaxError`].
fn extract_syntax_error(err: rustpython_vm::compiler::CompileError) -> ExecError {
    let (row, col) = err.python_location();
    ExecError::SyntaxError {
        message: err.to_string(),
        line: row as u32,
        col: col as u32,
    }
}

/// Classify a raised Python exception into an [`ExecError`].
///
/// `SystemExit` and `KeyboardInterrupt` get dedicated variants so diagnosis
/// can render a readable message instead of their (empty) native text; every
/// other exception is a runtime error carrying its message and traceback.
fn classify_exception(vm: &VirtualMachine, exc: PyBaseExceptionRef) -> ExecError {
    if exc.fast_isinstance(vm.ctx.exceptions.system_exit) {
        return ExecError::SystemExit;
    }
    if exc.fast_isinstance(vm.ctx.exceptions.keyboard_interrupt) {
        return ExecError::Interrupted;
    }

    // Exception message via str().
    let message = exc
        .as_object()
        .str(vm)
        .map(|s| s.as_str().to_owned())
        .unwrap_or_else(|_| "Unknown runtime error".to_owned());

    // Formatted traceback. String implements py_io::Write via write_fmt.
    let mut traceback = String::new();
    let _ = vm.write_exception(&mut traceback, &exc);

    ExecError::RuntimeError { message, traceback }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn run_exec(source: &str) -> Result<(), ExecError> {
        let interp = build_interpreter();
        let mut cache = CodeCache::new(4);
        interp.enter(|vm| {
            let scope = vm.new_scope_with_builtins();
            exec_in_scope(vm, &scope, source, &mut cache)
        })
    }

    // (1) definitions persist in the scope between exec and eval
    #[test]
    #[ignore = "slow: VM init per test"]
    fn test_exec_then_eval_shares_scope() {
        let interp = build_interpreter();
        let mut cache = CodeCache::new(4);
        let value = interp.enter(|vm| {
            let scope = vm.new_scope_with_builtins();
            exec_in_scope(vm, &scope, "def add(a, b):\n    return a + b", &mut cache)
                .expect("exec failed");
            eval_in_scope(vm, &scope, "add(1, 2)")
        });
        assert_eq!(value, Ok("3".to_string()));
    }

    // (2) syntax error input returns SyntaxError variant with line > 0
    #[test]
    #[ignore = "slow: VM init per test"]
    fn test_syntax_error() {
        match run_exec("def f(:") {
            Err(ExecError::SyntaxError { line, .. }) => {
                assert!(line > 0, "Expected line > 0, got {}", line);
            }
            other => panic!("Expected SyntaxError, got: {:?}", other),
        }
    }

    // (3) ZeroDivisionError returns RuntimeError with 'division' in message
    #[test]
    #[ignore = "slow: VM init per test"]
    fn test_zero_division_error() {
        match run_exec("x = 1/0") {
            Err(ExecError::RuntimeError { ref message, .. }) => {
                assert!(
                    message.to_lowercase().contains("division"),
                    "Expected 'division' in message, got: {message}"
                );
            }
            other => panic!("Expected RuntimeError, got: {:?}", other),
        }
    }

    // (4) exit() / raise KeyboardInterrupt map to the interrupt-class variants
    #[test]
    #[ignore = "slow: VM init per test"]
    fn test_interrupt_class_exceptions() {
        assert_eq!(run_exec("raise SystemExit()"), Err(ExecError::SystemExit));
        assert_eq!(
            run_exec("raise KeyboardInterrupt()"),
            Err(ExecError::Interrupted)
        );
    }

    // (5) print output lands in the buffer, not on the process stdout
    #[test]
    #[ignore = "slow: VM init per test"]
    fn test_stdout_capture() {
        let interp = build_interpreter();
        let mut cache = CodeCache::new(4);
        let output = OutputBuffer::new(1_048_576);
        let result = interp.enter(|vm| {
            install_output_capture(vm, output.clone());
            let scope = vm.new_scope_with_builtins();
            exec_in_scope(vm, &scope, "print('hello')", &mut cache)
        });
        assert!(result.is_ok(), "unexpected error: {:?}", result);
        let (stdout, _) = output.take_strings();
        assert_eq!(stdout, "hello\n");
    }

    // (6) the grading preamble imports from the frozen stdlib, with no
    //     dependency on (or interference from) a host CPython installation
    #[test]
    #[ignore = "slow: VM init per test"]
    fn test_typing_preamble_uses_frozen_stdlib() {
        let interp = build_interpreter();
        let mut cache = CodeCache::new(4);
        let value = interp.enter(|vm| {
            let scope = vm.new_scope_with_builtins();
            exec_in_scope(
                vm,
                &scope,
                "from typing import *\nimport collections",
                &mut cache,
            )
            .expect("frozen stdlib import failed");
            // typing's wildcard exports are usable after the preamble.
            eval_in_scope(vm, &scope, "Optional[int] is not None")
        });
        assert_eq!(value, Ok("True".to_string()));
    }

    // (7) eval renders values via str(), not repr()
    #[test]
    #[ignore = "slow: VM init per test"]
    fn test_eval_renders_str() {
        let interp = build_interpreter();
        let value = interp.enter(|vm| {
            let scope = vm.new_scope_with_builtins();
            eval_in_scope(vm, &scope, "'text'")
        });
        // str('text') is "text" — no quotes, unlike repr.
        assert_eq!(value, Ok("text".to_string()));
    }
}
