//! End-to-end compilation scenarios.
//!
//! Each test drives the full pipeline through `compile` and checks the
//! emitted JavaScript text, mirroring how embedders consume the crate.

use hql::{CompileOptions, ErrorKind, Phase, compile};
use pretty_assertions::assert_eq;

/// Compiles and unwraps the emitted code, failing on any diagnostic.
fn compile_ok(source: &str) -> String {
    let output = compile(source, &CompileOptions::default());
    assert!(
        output.diagnostics.is_empty(),
        "unexpected diagnostics: {:?}",
        output.diagnostics
    );
    output.code.expect("code should be emitted")
}

// =============================================================================
// 1. literal declarations
// =============================================================================

#[test]
fn def_number() {
    assert_eq!(compile_ok("(def x 10)"), "const x = 10;\n");
}

#[test]
fn def_string_bool_nil() {
    let code = compile_ok(r#"(def s "hi") (def t true) (def n nil)"#);
    assert!(code.contains(r#"const s = "hi";"#));
    assert!(code.contains("const t = true;"));
    assert!(code.contains("const n = null;"));
}

/// JSON-compatible literals survive structurally: arrays, maps, nesting.
#[test]
fn literal_round_trip() {
    let code = compile_ok(r#"(def v [1, "two", true, nil, [3]])"#);
    assert!(code.contains(r#"const v = [1, "two", true, null, [3]];"#));

    let code = compile_ok(r#"(def m {name: "hql", "dash-key": 2})"#);
    assert!(code.contains(r#"const m = { name: "hql", "dash-key": 2 };"#));
}

#[test]
fn empty_set_literal() {
    assert_eq!(compile_ok("(def empty-set #[])"), "const emptySet = new Set([]);\n");
}

#[test]
fn set_literal_with_elements() {
    assert_eq!(compile_ok("(def s #[1 2 3])"), "const s = new Set([1, 2, 3]);\n");
}

// =============================================================================
// 2. functions
// =============================================================================

#[test]
fn defn_add() {
    let code = compile_ok("(defn add (x y) (+ x y))");
    assert_eq!(code, "function add(x, y) {\n  return (x + y);\n}\n");
}

#[test]
fn multi_form_body_returns_last() {
    let code = compile_ok("(defn f (x) (js/console.log x) (* x 2))");
    assert!(code.contains("console.log(x);"));
    assert!(code.contains("return (x * 2);"));
}

#[test]
fn anonymous_fn_expression() {
    let code = compile_ok("(def double (fn (x) (* x 2)))");
    assert!(code.contains("const double = function (x) {"));
    assert!(code.contains("return (x * 2);"));
}

// =============================================================================
// 3. operators
// =============================================================================

#[test]
fn operator_chains_left_fold() {
    assert_eq!(compile_ok("(def s (+ 1 2 3))"), "const s = ((1 + 2) + 3);\n");
}

#[test]
fn operator_lisp_conventions() {
    assert_eq!(compile_ok("(def a (+))"), "const a = 0;\n");
    assert_eq!(compile_ok("(def b (* ))"), "const b = 1;\n");
    assert_eq!(compile_ok("(def c (- 5))"), "const c = (-5);\n");
    assert_eq!(compile_ok("(def d (/ x))"), "const d = (1 / x);\n");
}

#[test]
fn equality_is_strict() {
    assert_eq!(compile_ok("(def e (= a b))"), "const e = (a === b);\n");
    assert_eq!(compile_ok("(def ne (!= a b))"), "const ne = (a !== b);\n");
}

#[test]
fn logic_macros_become_operators() {
    assert_eq!(compile_ok("(def x (and a b c))"), "const x = ((a && b) && c);\n");
    assert_eq!(compile_ok("(def y (or a b))"), "const y = (a || b);\n");
    assert_eq!(compile_ok("(def z (not a))"), "const z = (!a);\n");
    assert_eq!(compile_ok("(def t (and))"), "const t = true;\n");
    assert_eq!(compile_ok("(def u (and a))"), "const u = a;\n");
}

// =============================================================================
// 4. conditionals
// =============================================================================

#[test]
fn cond_nests_ternaries_to_the_right() {
    let code = compile_ok(r#"(def sign (cond (< x 0) "neg" (> x 0) "pos" true "zero"))"#);
    assert_eq!(
        code,
        "const sign = ((x < 0) ? \"neg\" : ((x > 0) ? \"pos\" : \"zero\"));\n"
    );
}

#[test]
fn cond_accepts_else_keyword() {
    let code = compile_ok(r#"(def sign (cond (< x 0) "neg" :else "other"))"#);
    assert_eq!(code, "const sign = ((x < 0) ? \"neg\" : \"other\");\n");
}

#[test]
fn if_without_alternate_yields_null() {
    assert_eq!(compile_ok("(def v (if c 1))"), "const v = (c ? 1 : null);\n");
}

#[test]
fn when_emits_if_statement() {
    let code = compile_ok(r#"(when flag (js/console.log "yes"))"#);
    assert_eq!(code, "if (flag) {\n  console.log(\"yes\");\n}\n");
}

#[test]
fn unless_emits_else_branch() {
    let code = compile_ok(r#"(unless flag (js/console.log "no"))"#);
    assert_eq!(code, "if (flag) {\n} else {\n  console.log(\"no\");\n}\n");
}

// =============================================================================
// 5. enums, strings, canonicalization
// =============================================================================

#[test]
fn defenum_emits_member_mapping() {
    assert_eq!(
        compile_ok("(defenum Color red green blue)"),
        "const Color = { red: \"red\", green: \"green\", blue: \"blue\" };\n"
    );
}

#[test]
fn interpolated_string_becomes_template_literal() {
    assert_eq!(
        compile_ok(r#"(def g "Hello, \(name)!")"#),
        "const g = `Hello, ${name}!`;\n"
    );
}

#[test]
fn interpolated_identifier_is_canonicalized() {
    assert_eq!(
        compile_ok(r#"(def g "Hi \(user-name)")"#),
        "const g = `Hi ${userName}`;\n"
    );
}

#[test]
fn hyphenated_identifiers_canonicalize() {
    assert_eq!(compile_ok("(def deep-nested-name 1)"), "const deepNestedName = 1;\n");
    let code = compile_ok("(my-obj.do-thing 1)");
    assert_eq!(code, "myObj.doThing(1);\n");
}

#[test]
fn js_interop_names_stay_verbatim() {
    assert_eq!(compile_ok("(def log js/console.log)"), "const log = console.log;\n");
    // no camel rewriting on the interop side of the prefix
    assert_eq!(
        compile_ok("(js/window.setTimeout cb 100)"),
        "window.setTimeout(cb, 100);\n"
    );
}

// =============================================================================
// 6. member access, new, assignment, threading
// =============================================================================

#[test]
fn get_uses_dot_for_identifier_keys() {
    assert_eq!(compile_ok(r#"(def v (get obj "key"))"#), "const v = obj.key;\n");
    assert_eq!(
        compile_ok(r#"(def v (get obj "dash-key"))"#),
        "const v = obj[\"dash-key\"];\n"
    );
    assert_eq!(compile_ok("(def v (get obj k))"), "const v = obj[k];\n");
}

#[test]
fn new_expression() {
    assert_eq!(compile_ok("(def d (new Date 2020 1))"), "const d = new Date(2020, 1);\n");
}

#[test]
fn set_emits_assignment_statement() {
    assert_eq!(compile_ok("(set counter (+ counter 1))"), "counter = (counter + 1);\n");
}

#[test]
fn threading_macro_rewrites_pipelines() {
    assert_eq!(
        compile_ok("(def t (-> x (add 1) double))"),
        "const t = double(add(x, 1));\n"
    );
}

// =============================================================================
// 7. let and loops
// =============================================================================

#[test]
fn let_becomes_a_block() {
    let code = compile_ok("(let [a 1 b (+ a 2)] (js/console.log a b))");
    assert_eq!(
        code,
        "{\n  const a = 1;\n  const b = (a + 2);\n  console.log(a, b);\n}\n"
    );
}

#[test]
fn let_in_tail_position_returns_its_last_expression() {
    let code = compile_ok("(defn f (x) (let [y (* x 2)] (+ y 1)))");
    assert!(code.contains("const y = (x * 2);"));
    assert!(code.contains("return (y + 1);"));
}

#[test]
fn for_over_range_counts() {
    let code = compile_ok("(for [i (range 5)] (js/console.log i))");
    assert_eq!(
        code,
        "for (let i = 0; (i < 5); i = (i + 1)) {\n  console.log(i);\n}\n"
    );
}

#[test]
fn for_over_range_with_bounds_and_step() {
    let code = compile_ok("(for [i (range 2 10 2)] (js/console.log i))");
    assert_eq!(
        code,
        "for (let i = 2; (i < 10); i = (i + 2)) {\n  console.log(i);\n}\n"
    );
}

#[test]
fn for_over_collection_uses_for_each() {
    let code = compile_ok("(for [x xs] (js/console.log x))");
    assert_eq!(code, "xs.forEach(function (x) {\n  console.log(x);\n});\n");
}

#[test]
fn classical_for_with_three_forms() {
    let code = compile_ok("(for [(def i 0) (< i n) (set i (+ i 1))] (js/console.log i))");
    assert_eq!(
        code,
        "for (let i = 0; (i < n); i = (i + 1)) {\n  console.log(i);\n}\n"
    );
}

// =============================================================================
// 8. quoting
// =============================================================================

#[test]
fn quoted_list_is_array_data() {
    assert_eq!(compile_ok("(def xs '(1 2 3))"), "const xs = [1, 2, 3];\n");
}

#[test]
fn quoted_symbol_is_a_string() {
    assert_eq!(compile_ok("(def s 'hello-world)"), "const s = \"hello-world\";\n");
}

#[test]
fn quasiquote_without_unquote_is_quote() {
    assert_eq!(compile_ok("(def q `(1 2))"), "const q = [1, 2];\n");
}

// =============================================================================
// 9. failure surface
// =============================================================================

#[test]
fn unclosed_paren_is_a_single_read_diagnostic() {
    let output = compile("(def x", &CompileOptions::default());
    assert!(output.code.is_none());
    assert_eq!(output.diagnostics.len(), 1);
    let diagnostic = &output.diagnostics[0];
    assert_eq!(diagnostic.kind, ErrorKind::UnclosedParen);
    assert_eq!(diagnostic.phase, Phase::Read);
    assert!(diagnostic.position.is_some());
}

#[test]
fn empty_input_compiles_to_empty_output() {
    assert_eq!(compile_ok(""), "");
    assert_eq!(compile_ok("; only a comment"), "");
}

// =============================================================================
// 10. determinism
// =============================================================================

/// Identical input and options produce byte-identical output.
#[test]
fn compilation_is_deterministic() {
    let source = r#"
        (defmacro twice (x) `(+ ~x ~x))
        (defn add (x y) (+ x y))
        (def m {b: 2, a: 1})
        (def t (twice 21))
        (for [i (range 3)] (js/console.log i))
    "#;
    let first = compile_ok(source);
    let second = compile_ok(source);
    assert_eq!(first, second);
}

/// Property order in emitted objects is authored order, not hash order.
#[test]
fn object_properties_keep_authored_order() {
    let code = compile_ok("(def m {z: 1, a: 2, m: 3})");
    assert_eq!(code, "const m = { z: 1, a: 2, m: 3 };\n");
}
