//! Call extractor: isolate the call-under-test inside a test assertion.
//!
//! A test assertion usually has the shape `assert f(args) == expected`. For
//! failure diagnosis the engine wants to re-evaluate just `f(args)` to capture
//! the value the candidate actually produced. This module parses the assertion
//! with `rustpython-parser` and slices the relevant sub-expression back out of
//! the original source text using the AST node's byte range, so the extracted
//! snippet is verbatim re-evaluatable source.
//!
//! Extraction is a diagnostic aid, not a contract: any parse failure (or an
//! assertion shape we don't recognize) falls back to the raw assertion text.

use rustpython_parser::ast::{self, Ranged};
use rustpython_parser::Parse;

/// Return the source text of the call-under-test inside `assertion`.
///
/// - `assert f(x) == y` → `"f(x)"` (left operand of the comparison)
/// - `assert is_valid(x)` → `"is_valid(x)"` (whole asserted expression)
/// - anything that fails to parse → the raw assertion text, unmodified
pub fn call_expression(assertion: &str) -> String {
    extract(assertion).unwrap_or_else(|| assertion.to_owned())
}

/// Best-effort extraction; `None` means "use the raw text".
fn extract(assertion: &str) -> Option<String> {
    let suite = ast::Suite::parse(assertion, "<test>").ok()?;
    let stmt = suite.first()?;

    // The asserted (or bare) boolean expression.
    let test: &ast::Expr = match stmt {
        ast::Stmt::Assert(assert_stmt) => &assert_stmt.test,
        ast::Stmt::Expr(expr_stmt) => &expr_stmt.value,
        _ => return None,
    };

    // For a binary comparison, the left operand is the call under test;
    // otherwise the whole expression is.
    let target: &ast::Expr = match test {
        ast::Expr::Compare(cmp) => &cmp.left,
        other => other,
    };

    let range = target.range();
    assertion
        .get(usize::from(range.start())..usize::from(range.end()))
        .map(|s| s.trim().to_owned())
}
