//! Named-argument functions: declarations, call sites and their
//! consistency guarantees.

use hql::{CompileOptions, ErrorKind, compile};
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

/// The canonical declaration/call pair: one `params` parameter, a
/// destructuring prologue, and an object-literal argument.
#[test]
fn typed_parameters_switch_to_named_argument_mode() {
    let code = compile_ok("(defn subtract (x: Number y: Number) (- x y))\n(subtract x: 10 y: 5)");
    assert!(code.contains("function subtract(params) {"), "got:\n{code}");
    assert!(code.contains("const { x, y } = params;"), "got:\n{code}");
    assert!(code.contains("return (x - y);"), "got:\n{code}");
    assert!(code.contains("subtract({ x: 10, y: 5 });"), "got:\n{code}");
}

/// One `:`-marked parameter flips the whole declaration.
#[test]
fn a_single_marker_flips_the_declaration() {
    let code = compile_ok("(defn f (a: Number) a)");
    assert!(code.contains("function f(params) {"));
    assert!(code.contains("const { a } = params;"));
}

/// Defaults recorded on parameters appear in the destructuring prologue.
#[test]
fn named_defaults_destructure_with_defaults() {
    let code = compile_ok(r#"(defn greet (name: String greeting: String = "Hello") (str greeting name))"#);
    assert!(
        code.contains(r#"const { name, greeting = "Hello" } = params;"#),
        "got:\n{code}"
    );
}

/// Positional parameters keep native JavaScript defaults.
#[test]
fn positional_defaults_emit_in_the_parameter_list() {
    let code = compile_ok("(defn inc (x step = 1) (+ x step))");
    assert!(code.contains("function inc(x, step = 1) {"), "got:\n{code}");
}

#[test]
fn rest_parameters_spread() {
    let code = compile_ok("(defn pack (first & rest-items) rest-items)");
    assert_eq!(code, "function pack(first, ...restItems) {\n  return restItems;\n}\n");
}

/// Named call sites always lower to the object-literal argument, even when
/// the callee is unknown to the compiler.
#[test]
fn named_call_sites_always_pass_an_object() {
    let code = compile_ok("(frob a: 1 b: 2)");
    assert_eq!(code, "frob({ a: 1, b: 2 });\n");
}

/// Named-argument keys are identifiers and canonicalize with the
/// parameters they name.
#[test]
fn named_argument_keys_canonicalize() {
    let code = compile_ok("(defn f (max-size: Number) max-size)\n(f max-size: 4)");
    assert!(code.contains("const { maxSize } = params;"));
    assert!(code.contains("f({ maxSize: 4 });"));
}

#[test]
fn mixing_named_and_positional_arguments_fails() {
    let output = compile("(f a: 1 2)", &CompileOptions::default());
    assert!(output.code.is_none());
    assert_eq!(output.diagnostics[0].kind, ErrorKind::BadArgumentCount);
}

#[test]
fn duplicate_parameters_fail() {
    let output = compile("(defn f (x x) x)", &CompileOptions::default());
    assert!(output.code.is_none());
    assert_eq!(output.diagnostics[0].kind, ErrorKind::BadArgumentCount);
}

/// `fx` declarations validate and drop their return-type clause.
#[test]
fn fx_declarations_accept_a_return_type() {
    let code = compile_ok("(fx halve (n: Number) (-> Number) (/ n 2))");
    assert!(code.contains("function halve(params) {"), "got:\n{code}");
    assert!(code.contains("const { n } = params;"));
    assert!(code.contains("return (n / 2);"));
}

#[test]
fn fx_void_return_type_is_permitted() {
    let code = compile_ok("(fx log-it (msg: String) (-> Void) (js/console.log msg))");
    assert!(code.contains("function logIt(params) {"), "got:\n{code}");
}
