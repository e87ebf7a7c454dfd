//! User-defined macros: templates, splicing, hygiene and failure modes.

use hql::{CompileOptions, ErrorKind, Phase, compile};
use pretty_assertions::assert_eq;

fn compile_ok(source: &str) -> String {
    let output = compile(source, &CompileOptions::default());
    assert!(
        output.diagnostics.is_empty(),
        "unexpected diagnostics: {:?}",
        output.diagnostics
    );
    output.code.expect("code should be emitted")
}

fn compile_err(source: &str) -> hql::Diagnostic {
    let output = compile(source, &CompileOptions::default());
    assert!(output.code.is_none(), "expected failure, got code: {:?}", output.code);
    assert_eq!(output.diagnostics.len(), 1, "expected exactly one diagnostic");
    output.diagnostics.into_iter().next().expect("length checked above")
}

// =============================================================================
// 1. template realization
// =============================================================================

/// A macro definition leaves no trace in the output; its uses are rewritten.
#[test]
fn defmacro_installs_and_vanishes() {
    let code = compile_ok("(defmacro identity-of (x) `~x)\n(def z (identity-of 42))");
    assert_eq!(code, "const z = 42;\n");
}

#[test]
fn template_substitutes_parameters() {
    let code = compile_ok("(defmacro twice (x) `(+ ~x ~x))\n(def y (twice 3))");
    assert_eq!(code, "const y = (3 + 3);\n");
}

/// Macro expansion happens before canonicalization, so templates see the
/// original hyphenated spelling of their arguments.
#[test]
fn macros_see_original_names() {
    let code = compile_ok("(defmacro pass (x) `~x)\n(def out (pass my-value))");
    assert_eq!(code, "const out = myValue;\n");
}

#[test]
fn unquote_splicing_flattens_rest_arguments() {
    let code = compile_ok("(defmacro call-with (f & args) `(~f ~@args))\n(call-with add 1 2)");
    assert_eq!(code, "add(1, 2);\n");
}

#[test]
fn rest_parameter_spelled_with_ampersand_prefix() {
    let code = compile_ok("(defmacro run-all (&forms) `(do ~@forms))\n(run-all (js/a) (js/b))");
    assert_eq!(code, "{\n  a();\n  b();\n}\n");
}

/// Macros expand recursively until no macro heads remain.
#[test]
fn macro_results_are_re_expanded() {
    let code = compile_ok(
        "(defmacro plus-two (x) `(+ ~x 2))\n(defmacro plus-four (x) `(plus-two (plus-two ~x)))\n(def n (plus-four 1))",
    );
    assert_eq!(code, "const n = ((1 + 2) + 2);\n");
}

/// Redefinition replaces the previous rule.
#[test]
fn redefinition_replaces_the_rule() {
    let code = compile_ok(
        "(defmacro answer () `1)\n(defmacro answer () `2)\n(def a (answer))",
    );
    assert_eq!(code, "const a = 2;\n");
}

// =============================================================================
// 2. hygiene
// =============================================================================

/// `$`-marked template locals are renamed per expansion and cannot capture
/// call-site bindings.
#[test]
fn template_locals_are_gensym_renamed() {
    let code = compile_ok(
        "(defmacro sum-twice (a) `(let [$tmp ~a] (+ $tmp $tmp)))\n(def r (sum-twice 7))",
    );
    assert!(code.contains("$tmp__g0"), "expected a gensym rename, got:\n{code}");
    assert!(!code.contains("const $tmp ="), "template local leaked unrenamed:\n{code}");
}

/// Two expansions of the same macro get distinct renames.
#[test]
fn each_expansion_renames_freshly() {
    let code = compile_ok(
        "(defmacro keep (a) `(let [$slot ~a] $slot))\n(def p (keep 1))\n(def q (keep 2))",
    );
    assert!(code.contains("$slot__g0"));
    assert!(code.contains("$slot__g1"));
}

// =============================================================================
// 3. failure modes
// =============================================================================

#[test]
fn arity_mismatch_is_reported() {
    let diagnostic = compile_err("(defmacro twice (x) `(+ ~x ~x))\n(twice 1 2)");
    assert_eq!(diagnostic.kind, ErrorKind::MacroArityMismatch);
    assert_eq!(diagnostic.phase, Phase::Expand);
}

#[test]
fn duplicate_parameter_is_reported() {
    let diagnostic = compile_err("(defmacro bad (x x) `~x)");
    assert_eq!(diagnostic.kind, ErrorKind::DuplicateParameter);
}

#[test]
fn unbound_unquote_is_reported() {
    let diagnostic = compile_err("(defmacro bad (x) `(+ ~y 1))\n(bad 1)");
    assert_eq!(diagnostic.kind, ErrorKind::UnknownMacro);
}

#[test]
fn splicing_a_non_sequence_is_reported() {
    let diagnostic = compile_err("(defmacro bad (x) `(do ~@x))\n(bad 1)");
    assert_eq!(diagnostic.kind, ErrorKind::MalformedTemplate);
}

/// A macro whose expansion keeps producing itself hits the iteration cap.
#[test]
fn self_reproducing_macro_hits_the_limit() {
    let source = "(defmacro spin (x) `(spin ~x))\n(spin 1)";
    let options = CompileOptions {
        iteration_limit: 16,
        ..CompileOptions::default()
    };
    let output = compile(source, &options);
    assert!(output.code.is_none());
    assert_eq!(output.diagnostics[0].kind, ErrorKind::RecursionLimitExceeded);
}

/// A macro that grows through nesting hits the depth cap instead.
#[test]
fn self_nesting_macro_hits_the_depth_limit() {
    let source = "(defmacro wrap (x) `(do (wrap ~x)))\n(wrap 1)";
    let options = CompileOptions {
        recursion_limit: 16,
        ..CompileOptions::default()
    };
    let output = compile(source, &options);
    assert!(output.code.is_none());
    assert_eq!(output.diagnostics[0].kind, ErrorKind::RecursionLimitExceeded);
}

#[test]
fn unquote_outside_any_macro_is_rejected() {
    let diagnostic = compile_err("(def q `(+ ~loose 1))");
    assert_eq!(diagnostic.kind, ErrorKind::UnknownMacro);
}

// =============================================================================
// 4. expansion and binders
// =============================================================================

/// Binder positions are not expandable heads: a parameter may shadow a
/// macro name without being rewritten.
#[test]
fn parameter_lists_shadow_macro_names() {
    let code = compile_ok("(defn weird (cond) (+ cond 1))");
    assert_eq!(code, "function weird(cond) {\n  return (cond + 1);\n}\n");
}

/// `quote` blocks expansion of its payload entirely.
#[test]
fn quote_blocks_macro_expansion() {
    let code = compile_ok("(def q '(when a b))");
    assert_eq!(code, "const q = [\"when\", \"a\", \"b\"];\n");
}
