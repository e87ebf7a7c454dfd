use std::{borrow::Cow, fmt};

use crate::{
    ir::{Expr, FunctionDecl, Program, Property, Stmt},
    names::is_valid_js_identifier,
};

/// An internal invariant violation surfaced by the emitter.
///
/// Well-formed IR never triggers these; seeing one means a lowering bug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitError {
    pub message: Cow<'static, str>,
}

impl EmitError {
    fn internal(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "internal emitter error: {}", self.message)
    }
}

impl std::error::Error for EmitError {}

/// Emits a program as JavaScript source.
///
/// Pure and deterministic: stable two-space indentation, authored property
/// order, every binary operation parenthesized. Identical IR yields a
/// byte-identical string.
pub fn emit_program(program: &Program) -> Result<String, EmitError> {
    let mut emitter = Emitter::new();
    for stmt in &program.body {
        emitter.emit_stmt(stmt)?;
    }
    Ok(emitter.out)
}

struct Emitter {
    out: String,
    indent: usize,
}

impl Emitter {
    fn new() -> Self {
        Self {
            out: String::new(),
            indent: 0,
        }
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
    }

    fn emit_stmt(&mut self, stmt: &Stmt) -> Result<(), EmitError> {
        match stmt {
            Stmt::VariableDeclaration { kind, name, init } => {
                self.write_indent();
                self.out.push_str(&format!("{kind} {name} = "));
                self.emit_expr(init)?;
                self.out.push_str(";\n");
            }
            Stmt::FunctionDeclaration(function) => {
                if function.name.is_none() {
                    return Err(EmitError::internal("anonymous function in declaration position"));
                }
                self.write_indent();
                self.emit_function(function)?;
                self.out.push('\n');
            }
            Stmt::Return(argument) => {
                self.write_indent();
                match argument {
                    Some(expr) => {
                        self.out.push_str("return ");
                        self.emit_expr(expr)?;
                        self.out.push_str(";\n");
                    }
                    None => self.out.push_str("return;\n"),
                }
            }
            Stmt::Expr(expr) => self.emit_expr_stmt(expr)?,
            Stmt::Block(body) => {
                self.write_indent();
                self.out.push_str("{\n");
                self.indent += 1;
                for stmt in body {
                    self.emit_stmt(stmt)?;
                }
                self.indent -= 1;
                self.write_indent();
                self.out.push_str("}\n");
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => self.emit_for(init.as_deref(), test.as_ref(), update.as_ref(), body)?,
            Stmt::EnumDeclaration { name, members } => {
                self.write_indent();
                self.out.push_str(&format!("const {name} = "));
                if members.is_empty() {
                    self.out.push_str("{}");
                } else {
                    self.out.push_str("{ ");
                    for (index, member) in members.iter().enumerate() {
                        if index > 0 {
                            self.out.push_str(", ");
                        }
                        self.push_property_key(member);
                        self.out.push_str(": ");
                        self.push_string_literal(member);
                    }
                    self.out.push_str(" }");
                }
                self.out.push_str(";\n");
            }
            Stmt::ImportDeclaration { specifier, binding } => {
                self.write_indent();
                self.out.push_str(&format!("import * as {binding}_ns from "));
                self.push_string_literal(specifier);
                self.out.push_str(";\n");
                self.write_indent();
                self.out.push_str(&format!(
                    "const {binding} = {binding}_ns.default !== undefined ? {binding}_ns.default : {binding}_ns;\n"
                ));
            }
            Stmt::ExportDeclaration { exports } => {
                self.write_indent();
                self.out.push_str("export { ");
                for (index, pair) in exports.iter().enumerate() {
                    if index > 0 {
                        self.out.push_str(", ");
                    }
                    self.out.push_str(&pair.local);
                    self.out.push_str(" as ");
                    if is_valid_js_identifier(&pair.exported) {
                        self.out.push_str(&pair.exported);
                    } else {
                        self.push_string_literal(&pair.exported);
                    }
                }
                self.out.push_str(" };\n");
            }
        }
        Ok(())
    }

    /// An expression in statement position: conditionals render as
    /// `if`/`else`, assignments drop their wrapping parentheses.
    fn emit_expr_stmt(&mut self, expr: &Expr) -> Result<(), EmitError> {
        match expr {
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => self.emit_if(test, consequent, alternate),
            Expr::Assignment { target, value } => {
                self.write_indent();
                self.emit_expr(target)?;
                self.out.push_str(" = ");
                self.emit_expr(value)?;
                self.out.push_str(";\n");
                Ok(())
            }
            _ => {
                self.write_indent();
                self.emit_expr(expr)?;
                self.out.push_str(";\n");
                Ok(())
            }
        }
    }

    /// A conditional in statement position.
    fn emit_if(&mut self, test: &Expr, consequent: &Expr, alternate: &Expr) -> Result<(), EmitError> {
        self.write_indent();
        self.out.push_str("if (");
        self.emit_expr(test)?;
        self.out.push_str(") {\n");
        self.indent += 1;
        self.emit_branch(consequent)?;
        self.indent -= 1;
        self.write_indent();
        self.out.push('}');
        if matches!(alternate, Expr::Null) {
            self.out.push('\n');
            return Ok(());
        }
        self.out.push_str(" else ");
        if let Expr::Conditional {
            test,
            consequent,
            alternate,
        } = alternate
        {
            // else-if chains stay flat
            let mark = self.out.len();
            self.emit_if(test, consequent, alternate)?;
            // drop the indentation emit_if wrote before `if`
            let written: String = self.out.split_off(mark);
            self.out.push_str(written.trim_start_matches(' '));
            return Ok(());
        }
        self.out.push_str("{\n");
        self.indent += 1;
        self.emit_branch(alternate)?;
        self.indent -= 1;
        self.write_indent();
        self.out.push_str("}\n");
        Ok(())
    }

    /// The body of one `if`/`else` branch.
    ///
    /// Blocks that lowering packaged as argument-less immediately-invoked
    /// functions are unwrapped back into plain statements, with the tail
    /// `return` turned into an expression statement.
    fn emit_branch(&mut self, expr: &Expr) -> Result<(), EmitError> {
        if matches!(expr, Expr::Null) {
            return Ok(());
        }
        if let Expr::Call {
            callee, arguments, ..
        } = expr
        {
            if arguments.is_empty() {
                if let Expr::Function(function) = callee.as_ref() {
                    if function.name.is_none() && function.params.is_empty() && !function.is_named_args {
                        return self.emit_unwrapped(&function.body);
                    }
                }
            }
        }
        self.emit_expr_stmt(expr)
    }

    fn emit_unwrapped(&mut self, body: &[Stmt]) -> Result<(), EmitError> {
        for stmt in body {
            match stmt {
                Stmt::Return(Some(expr)) => self.emit_expr_stmt(expr)?,
                Stmt::Return(None) => {}
                Stmt::Block(inner) => self.emit_unwrapped(inner)?,
                other => self.emit_stmt(other)?,
            }
        }
        Ok(())
    }

    fn emit_for(
        &mut self,
        init: Option<&Stmt>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &[Stmt],
    ) -> Result<(), EmitError> {
        self.write_indent();
        self.out.push_str("for (");
        match init {
            Some(Stmt::VariableDeclaration { kind, name, init }) => {
                self.out.push_str(&format!("{kind} {name} = "));
                self.emit_expr(init)?;
            }
            Some(Stmt::Expr(expr)) => self.emit_bare_expr(expr)?,
            Some(_) => return Err(EmitError::internal("unsupported loop initializer")),
            None => {}
        }
        self.out.push_str("; ");
        if let Some(test) = test {
            self.emit_expr(test)?;
        }
        self.out.push_str("; ");
        if let Some(update) = update {
            self.emit_bare_expr(update)?;
        }
        self.out.push_str(") {\n");
        self.indent += 1;
        for stmt in body {
            self.emit_stmt(stmt)?;
        }
        self.indent -= 1;
        self.write_indent();
        self.out.push_str("}\n");
        Ok(())
    }

    /// An expression without statement framing; assignments print bare
    /// (`i = (i + 1)`), used in `for` headers.
    fn emit_bare_expr(&mut self, expr: &Expr) -> Result<(), EmitError> {
        if let Expr::Assignment { target, value } = expr {
            self.emit_expr(target)?;
            self.out.push_str(" = ");
            self.emit_expr(value)?;
            return Ok(());
        }
        self.emit_expr(expr)
    }

    fn emit_function(&mut self, function: &FunctionDecl) -> Result<(), EmitError> {
        match &function.name {
            Some(name) => self.out.push_str(&format!("function {name}(")),
            None => self.out.push_str("function ("),
        }
        if function.is_named_args {
            self.out.push_str("params");
        } else {
            for (index, param) in function.params.iter().enumerate() {
                if index > 0 {
                    self.out.push_str(", ");
                }
                if param.is_rest {
                    self.out.push_str("...");
                }
                self.out.push_str(&param.name);
                if let Some(default) = &param.default_value {
                    self.out.push_str(" = ");
                    self.emit_expr(default)?;
                }
            }
        }
        self.out.push_str(") {\n");
        self.indent += 1;
        if function.is_named_args {
            self.emit_params_prologue(function)?;
        }
        for stmt in &function.body {
            self.emit_stmt(stmt)?;
        }
        self.indent -= 1;
        self.write_indent();
        self.out.push('}');
        Ok(())
    }

    /// `const { a, b = default } = params;` for named-argument functions.
    fn emit_params_prologue(&mut self, function: &FunctionDecl) -> Result<(), EmitError> {
        self.write_indent();
        self.out.push_str("const { ");
        for (index, param) in function.params.iter().enumerate() {
            if index > 0 {
                self.out.push_str(", ");
            }
            self.out.push_str(&param.name);
            if let Some(default) = &param.default_value {
                self.out.push_str(" = ");
                self.emit_expr(default)?;
            }
        }
        self.out.push_str(" } = params;\n");
        Ok(())
    }

    fn emit_expr(&mut self, expr: &Expr) -> Result<(), EmitError> {
        match expr {
            Expr::Num(n) => self.out.push_str(&format_number(*n)),
            Expr::Str(value) => self.push_string_literal(value),
            Expr::Bool(b) => self.out.push_str(if *b { "true" } else { "false" }),
            Expr::Null => self.out.push_str("null"),
            Expr::Identifier { name, .. } => self.out.push_str(name),
            Expr::Template { quasis, expressions } => self.emit_template(quasis, expressions)?,
            Expr::Array(elements) => {
                self.out.push('[');
                for (index, element) in elements.iter().enumerate() {
                    if index > 0 {
                        self.out.push_str(", ");
                    }
                    self.emit_expr(element)?;
                }
                self.out.push(']');
            }
            Expr::Object(properties) => self.emit_object(properties)?,
            Expr::Binary { op, left, right } => {
                self.out.push('(');
                self.emit_expr(left)?;
                self.out.push_str(&format!(" {op} "));
                self.emit_expr(right)?;
                self.out.push(')');
            }
            Expr::Unary { op, operand } => {
                self.out.push('(');
                self.out.push_str(&op.to_string());
                self.emit_expr(operand)?;
                self.out.push(')');
            }
            Expr::Call {
                callee, arguments, ..
            } => {
                self.emit_callee(callee)?;
                self.out.push('(');
                for (index, argument) in arguments.iter().enumerate() {
                    if index > 0 {
                        self.out.push_str(", ");
                    }
                    self.emit_expr(argument)?;
                }
                self.out.push(')');
            }
            Expr::New { callee, arguments } => {
                self.out.push_str("new ");
                self.emit_callee(callee)?;
                self.out.push('(');
                for (index, argument) in arguments.iter().enumerate() {
                    if index > 0 {
                        self.out.push_str(", ");
                    }
                    self.emit_expr(argument)?;
                }
                self.out.push(')');
            }
            Expr::Member {
                object,
                property,
                computed,
            } => {
                self.emit_member_object(object)?;
                if *computed {
                    self.out.push('[');
                    self.emit_expr(property)?;
                    self.out.push(']');
                } else {
                    let Expr::Str(name) = property.as_ref() else {
                        return Err(EmitError::internal("non-computed member access without a name"));
                    };
                    self.out.push('.');
                    self.out.push_str(name);
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.out.push('(');
                self.emit_expr(test)?;
                self.out.push_str(" ? ");
                self.emit_expr(consequent)?;
                self.out.push_str(" : ");
                self.emit_expr(alternate)?;
                self.out.push(')');
            }
            Expr::Assignment { target, value } => {
                self.out.push('(');
                self.emit_expr(target)?;
                self.out.push_str(" = ");
                self.emit_expr(value)?;
                self.out.push(')');
            }
            Expr::Function(function) => self.emit_function(function)?,
        }
        Ok(())
    }

    /// Function expressions in callee position need wrapping parentheses.
    fn emit_callee(&mut self, callee: &Expr) -> Result<(), EmitError> {
        if matches!(callee, Expr::Function(_)) {
            self.out.push('(');
            self.emit_expr(callee)?;
            self.out.push(')');
            return Ok(());
        }
        self.emit_expr(callee)
    }

    /// Objects of member access that would misparse bare get parentheses.
    fn emit_member_object(&mut self, object: &Expr) -> Result<(), EmitError> {
        if matches!(object, Expr::Function(_) | Expr::Num(_) | Expr::Object(_)) {
            self.out.push('(');
            self.emit_expr(object)?;
            self.out.push(')');
            return Ok(());
        }
        self.emit_expr(object)
    }

    fn emit_object(&mut self, properties: &[Property]) -> Result<(), EmitError> {
        if properties.is_empty() {
            self.out.push_str("{}");
            return Ok(());
        }
        self.out.push_str("{ ");
        for (index, property) in properties.iter().enumerate() {
            if index > 0 {
                self.out.push_str(", ");
            }
            self.push_property_key(&property.key);
            self.out.push_str(": ");
            self.emit_expr(&property.value)?;
        }
        self.out.push_str(" }");
        Ok(())
    }

    fn emit_template(&mut self, quasis: &[String], expressions: &[Expr]) -> Result<(), EmitError> {
        self.out.push('`');
        for (index, quasi) in quasis.iter().enumerate() {
            self.out.push_str(&escape_template(quasi));
            if let Some(expr) = expressions.get(index) {
                self.out.push_str("${");
                self.emit_expr(expr)?;
                self.out.push('}');
            }
        }
        self.out.push('`');
        Ok(())
    }

    fn push_property_key(&mut self, key: &str) {
        if is_valid_js_identifier(key) {
            self.out.push_str(key);
        } else {
            self.push_string_literal(key);
        }
    }

    fn push_string_literal(&mut self, value: &str) {
        self.out.push('"');
        self.out.push_str(&escape_string(value));
        self.out.push('"');
    }
}

/// Integral values print without a fraction; everything else goes through
/// ryu's shortest representation. `NaN` and infinities print by name.
fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_owned();
    }
    if n.is_infinite() {
        return if n < 0.0 { "-Infinity".to_owned() } else { "Infinity".to_owned() };
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return format!("{}", n as i64);
    }
    let mut buffer = ryu::Buffer::new();
    buffer.format(n).to_owned()
}

fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

fn escape_template(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '`' => out.push_str("\\`"),
            '\\' => out.push_str("\\\\"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_numbers_have_no_fraction() {
        assert_eq!(format_number(10.0), "10");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(2.5), "2.5");
    }

    #[test]
    fn special_numbers_print_by_name() {
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn string_escapes_round_trip() {
        assert_eq!(escape_string("a\"b\\c\nd"), "a\\\"b\\\\c\\nd");
    }

    #[test]
    fn template_escapes_guard_interpolation_syntax() {
        assert_eq!(escape_template("a`b${c"), "a\\`b\\${c");
    }
}
