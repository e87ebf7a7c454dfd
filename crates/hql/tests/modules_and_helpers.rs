//! The driver surface: import resolution, exports, the helper prelude and
//! cooperative cancellation.

use hql::{CancelFlag, CompileOptions, ErrorKind, Phase, ResolvedImport, compile};
use pretty_assertions::assert_eq;

fn compile_ok(source: &str) -> String {
    compile_ok_with(source, &CompileOptions::default())
}

fn compile_ok_with(source: &str, options: &CompileOptions<'_>) -> String {
    let output = compile(source, options);
    assert!(
        output.diagnostics.is_empty(),
        "unexpected diagnostics: {:?}",
        output.diagnostics
    );
    output.code.expect("code should be emitted")
}

// =============================================================================
// 1. imports
// =============================================================================

/// Without a resolver every specifier passes through as an ES import with a
/// default-fallback alias.
#[test]
fn imports_pass_through_by_default() {
    let code = compile_ok(r#"(import utils "./utils.hql")"#);
    assert_eq!(
        code,
        "import * as utils_ns from \"./utils.hql\";\n\
         const utils = utils_ns.default !== undefined ? utils_ns.default : utils_ns;\n"
    );
}

#[test]
fn def_import_form_binds_the_module() {
    let code = compile_ok(r#"(def helpers (import "https://example.com/mod.hql"))"#);
    assert!(code.contains("import * as helpers_ns from \"https://example.com/mod.hql\";"));
    assert!(code.contains("const helpers = helpers_ns.default !== undefined"));
}

/// A resolver may rewrite the emitted specifier.
#[test]
fn passthrough_resolver_rewrites_specifiers() {
    let resolver = |specifier: &str| -> Result<ResolvedImport, String> {
        Ok(ResolvedImport::Passthrough(format!("https://cdn.example/{specifier}")))
    };
    let options = CompileOptions {
        resolve_import: Some(&resolver),
        ..CompileOptions::default()
    };
    let code = compile_ok_with(r#"(import utils "utils")"#, &options);
    assert!(code.contains("import * as utils_ns from \"https://cdn.example/utils\";"));
}

/// Inline imports splice the compiled module and bind an object built from
/// its exports.
#[test]
fn inline_imports_splice_the_module() {
    let resolver = |specifier: &str| -> Result<ResolvedImport, String> {
        assert_eq!(specifier, "./util.hql");
        Ok(ResolvedImport::Inline(
            "(def helper-value 42) (export \"helperValue\" helper-value)".to_owned(),
        ))
    };
    let options = CompileOptions {
        resolve_import: Some(&resolver),
        ..CompileOptions::default()
    };
    let code = compile_ok_with(r#"(def u (import "./util.hql")) (js/console.log (get u "helperValue"))"#, &options);
    assert!(code.contains("const helperValue = 42;"), "got:\n{code}");
    assert!(code.contains("const u = { helperValue: helperValue };"), "got:\n{code}");
    assert!(code.contains("console.log(u.helperValue);"), "got:\n{code}");
    assert!(!code.contains("import *"), "inline imports emit no ES import:\n{code}");
}

#[test]
fn resolver_failures_become_resolve_diagnostics() {
    let resolver =
        |_specifier: &str| -> Result<ResolvedImport, String> { Err("registry unreachable".to_owned()) };
    let options = CompileOptions {
        resolve_import: Some(&resolver),
        ..CompileOptions::default()
    };
    let output = compile(r#"(import utils "utils")"#, &options);
    assert!(output.code.is_none());
    let diagnostic = &output.diagnostics[0];
    assert_eq!(diagnostic.kind, ErrorKind::Resolve);
    assert_eq!(diagnostic.phase, Phase::Resolve);
    assert!(diagnostic.message.contains("registry unreachable"));
}

// =============================================================================
// 2. exports
// =============================================================================

#[test]
fn export_emits_the_exact_requested_name() {
    let code = compile_ok("(defn add-numbers (x y) (+ x y))\n(export \"addNumbers\" add-numbers)");
    assert!(code.contains("export { addNumbers as addNumbers };"), "got:\n{code}");
}

/// The exported string is preserved even when the local canonicalizes away
/// from it; invalid identifiers export via a string name.
#[test]
fn export_names_that_are_not_identifiers_are_quoted() {
    let code = compile_ok("(def thing 1)\n(export \"my-export\" thing)");
    assert!(code.contains("export { thing as \"my-export\" };"), "got:\n{code}");
}

#[test]
fn export_accepts_multiple_pairs() {
    let code = compile_ok("(def a 1)\n(def b 2)\n(export [\"first\" a \"second\" b])");
    assert!(code.contains("export { a as first, b as second };"), "got:\n{code}");
}

// =============================================================================
// 3. helper prelude
// =============================================================================

/// Referencing any helper pulls the prelude in, exactly once, ahead of the
/// program.
#[test]
fn helpers_emit_once_when_referenced() {
    let code = compile_ok("(def doubled (map (fn (x) (* x 2)) xs))\n(def total (reduce add 0 xs))");
    assert_eq!(code.matches("function map(").count(), 1, "got:\n{code}");
    assert_eq!(code.matches("function reduce(").count(), 1);
    assert!(code.starts_with("function list("), "prelude leads the output:\n{code}");
}

#[test]
fn no_helper_reference_means_no_prelude() {
    let code = compile_ok("(def x 1)");
    assert!(!code.contains("function list("));
}

/// Hosts that ship their own shims can turn the prelude off.
#[test]
fn emit_helpers_false_suppresses_the_prelude() {
    let options = CompileOptions {
        emit_helpers: false,
        ..CompileOptions::default()
    };
    let code = compile_ok_with("(def doubled (map f xs))", &options);
    assert_eq!(code, "const doubled = map(f, xs);\n");
}

// =============================================================================
// 4. cancellation
// =============================================================================

/// A cancel flag raised before the call aborts between stages with a
/// single diagnostic and no code.
#[test]
fn cancellation_yields_a_single_diagnostic() {
    let cancel = CancelFlag::new();
    cancel.cancel();
    let options = CompileOptions {
        cancel: cancel.clone(),
        ..CompileOptions::default()
    };
    let output = compile("(def x 1)", &options);
    assert!(output.code.is_none());
    assert_eq!(output.diagnostics.len(), 1);
    assert_eq!(output.diagnostics[0].kind, ErrorKind::Cancelled);
}

#[test]
fn fresh_flags_do_not_cancel() {
    let options = CompileOptions::default();
    assert!(!options.cancel.is_cancelled());
    let output = compile("(def x 1)", &options);
    assert!(output.code.is_some());
}
