use ahash::AHashSet;

use crate::ir::{Expr, FunctionDecl, Program, Stmt};

/// The identifiers backed by the helper prelude.
pub const HELPER_NAMES: [&str; 6] = ["list", "vector", "map", "filter", "reduce", "str"];

/// The runtime shims, emitted ahead of the program when any helper name is
/// referenced. One fixed block, one fixed order; emitted at most once per
/// compilation.
pub const HELPER_PRELUDE: &str = "\
function list(...items) {
  return items;
}
function vector(...items) {
  return items;
}
function map(f, coll) {
  return coll.map(f);
}
function filter(pred, coll) {
  return coll.filter(pred);
}
function reduce(f, init, coll) {
  return coll.reduce(f, init);
}
function str(...parts) {
  return parts.join(\"\");
}
";

/// True when the program references any helper identifier.
///
/// Declarations shadowing a helper name still count as a reference; the
/// prelude is harmless under shadowing and the scan stays simple.
pub fn references_helpers(program: &Program) -> bool {
    let names: AHashSet<&str> = HELPER_NAMES.into_iter().collect();
    program.body.iter().any(|stmt| stmt_references(stmt, &names))
}

fn stmt_references(stmt: &Stmt, names: &AHashSet<&str>) -> bool {
    match stmt {
        Stmt::VariableDeclaration { init, .. } => expr_references(init, names),
        Stmt::FunctionDeclaration(function) => function_references(function, names),
        Stmt::Return(argument) => argument.as_ref().is_some_and(|e| expr_references(e, names)),
        Stmt::Expr(expr) => expr_references(expr, names),
        Stmt::Block(body) => body.iter().any(|s| stmt_references(s, names)),
        Stmt::For {
            init,
            test,
            update,
            body,
        } => {
            init.as_deref().is_some_and(|s| stmt_references(s, names))
                || test.as_ref().is_some_and(|e| expr_references(e, names))
                || update.as_ref().is_some_and(|e| expr_references(e, names))
                || body.iter().any(|s| stmt_references(s, names))
        }
        Stmt::EnumDeclaration { .. } | Stmt::ImportDeclaration { .. } | Stmt::ExportDeclaration { .. } => false,
    }
}

fn function_references(function: &FunctionDecl, names: &AHashSet<&str>) -> bool {
    function
        .params
        .iter()
        .any(|p| p.default_value.as_ref().is_some_and(|e| expr_references(e, names)))
        || function.body.iter().any(|s| stmt_references(s, names))
}

fn expr_references(expr: &Expr, names: &AHashSet<&str>) -> bool {
    match expr {
        Expr::Identifier { name, is_js_access } => !is_js_access && names.contains(name.as_str()),
        Expr::Num(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Null => false,
        Expr::Template { expressions, .. } => expressions.iter().any(|e| expr_references(e, names)),
        Expr::Array(elements) => elements.iter().any(|e| expr_references(e, names)),
        Expr::Object(properties) => properties.iter().any(|p| expr_references(&p.value, names)),
        Expr::Binary { left, right, .. } => expr_references(left, names) || expr_references(right, names),
        Expr::Unary { operand, .. } => expr_references(operand, names),
        Expr::Call {
            callee, arguments, ..
        }
        | Expr::New { callee, arguments } => {
            expr_references(callee, names) || arguments.iter().any(|e| expr_references(e, names))
        }
        Expr::Member { object, property, .. } => {
            expr_references(object, names) || expr_references(property, names)
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            expr_references(test, names)
                || expr_references(consequent, names)
                || expr_references(alternate, names)
        }
        Expr::Assignment { target, value } => {
            expr_references(target, names) || expr_references(value, names)
        }
        Expr::Function(function) => function_references(function, names),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Program;

    #[test]
    fn empty_program_needs_no_helpers() {
        let program = Program { body: vec![] };
        assert!(!references_helpers(&program));
    }

    #[test]
    fn helper_reference_in_call_position_is_found() {
        let program = Program {
            body: vec![Stmt::Expr(Expr::Call {
                callee: Box::new(Expr::identifier("reduce")),
                arguments: vec![],
                is_named_args: false,
            })],
        };
        assert!(references_helpers(&program));
    }

    #[test]
    fn js_interop_names_do_not_count() {
        let program = Program {
            body: vec![Stmt::Expr(Expr::Identifier {
                name: "map".to_owned(),
                is_js_access: true,
            })],
        };
        assert!(!references_helpers(&program));
    }
}
