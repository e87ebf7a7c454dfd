use std::{borrow::Cow, fmt};

use ahash::AHashSet;
use smallvec::SmallVec;

use crate::{
    forms::{Form, FormValue, ListKind, Literal, Symbol},
    ir::{BinaryOp, DeclKind, ExportPair, Expr, FunctionDecl, ParamInfo, Program, Property, Stmt, UnaryOp},
    lex::CodeRange,
    names::{canonicalize, is_valid_js_identifier},
};

/// Errors produced while lowering expanded forms into the IR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LowerError {
    /// A special form appeared where it cannot, or a head the lowering
    /// tables do not know.
    UnknownSpecialForm {
        name: String,
        position: CodeRange,
    },
    BadArgumentCount {
        message: Cow<'static, str>,
        position: CodeRange,
    },
    /// A map key that is neither a string literal nor a symbol, or an
    /// unpaired map element.
    UnsupportedKeySyntax {
        message: Cow<'static, str>,
        position: CodeRange,
    },
}

impl LowerError {
    fn unknown_form(name: impl Into<String>, position: CodeRange) -> Self {
        Self::UnknownSpecialForm {
            name: name.into(),
            position,
        }
    }

    fn bad_args(message: impl Into<Cow<'static, str>>, position: CodeRange) -> Self {
        Self::BadArgumentCount {
            message: message.into(),
            position,
        }
    }

    fn bad_key(message: impl Into<Cow<'static, str>>, position: CodeRange) -> Self {
        Self::UnsupportedKeySyntax {
            message: message.into(),
            position,
        }
    }

    pub fn position(&self) -> CodeRange {
        match self {
            Self::UnknownSpecialForm { position, .. }
            | Self::BadArgumentCount { position, .. }
            | Self::UnsupportedKeySyntax { position, .. } => *position,
        }
    }
}

impl fmt::Display for LowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSpecialForm { name, position } => {
                write!(f, "special form `{name}` is not valid here at {}", position.start)
            }
            Self::BadArgumentCount { message, position } => {
                write!(f, "{message} at {}", position.start)
            }
            Self::UnsupportedKeySyntax { message, position } => {
                write!(f, "{message} at {}", position.start)
            }
        }
    }
}

impl std::error::Error for LowerError {}

/// Lowers an expanded program into the IR, applying identifier
/// canonicalization at this boundary.
pub fn lower_program(forms: &[Form]) -> Result<Program, LowerError> {
    let body = forms.iter().map(lower_stmt).collect::<Result<Vec<_>, _>>()?;
    Ok(Program { body })
}

/// Statement forms that produce no value; a function body ending in one of
/// these gets no synthesized `return`.
fn is_statement_head(head: &str) -> bool {
    matches!(
        head,
        "def" | "defun" | "loop" | "foreach" | "enum" | "import" | "export"
    )
}

fn lower_stmt(form: &Form) -> Result<Stmt, LowerError> {
    if let Some(head) = form.call_head() {
        match head {
            "def" => return lower_def(form),
            "defun" => return lower_defun(form),
            "do" => {
                let elements = form.call_elements().expect("matched as call");
                let body = elements[1..].iter().map(lower_stmt).collect::<Result<Vec<_>, _>>()?;
                return Ok(Stmt::Block(body));
            }
            "loop" => return lower_loop(form),
            "foreach" => return Ok(Stmt::Expr(lower_foreach(form)?)),
            "enum" => return lower_enum(form),
            "import" => return lower_import(form),
            "export" => return lower_export(form),
            _ => {}
        }
    }
    Ok(Stmt::Expr(lower_expr(form)?))
}

/// `(def x e)` → a `const` declaration; `(def x (import "spec"))` → an
/// import declaration bound to `x`.
fn lower_def(form: &Form) -> Result<Stmt, LowerError> {
    let elements = form.call_elements().expect("matched as call");
    if elements.len() != 3 {
        return Err(LowerError::bad_args(
            "`def` expects a name and one value",
            form.position,
        ));
    }
    let Some(name) = elements[1].symbol_name() else {
        return Err(LowerError::bad_args(
            format!("`def` expects a symbol name, found {}", elements[1].description()),
            elements[1].position,
        ));
    };
    let init = &elements[2];
    if init.call_head() == Some("import") {
        let import_elements = init.call_elements().expect("matched as call");
        if import_elements.len() != 2 {
            return Err(LowerError::bad_args(
                "`import` expects one specifier string",
                init.position,
            ));
        }
        let Some(specifier) = as_plain_string(&import_elements[1]) else {
            return Err(LowerError::bad_args(
                "`import` expects a string specifier",
                import_elements[1].position,
            ));
        };
        return Ok(Stmt::ImportDeclaration {
            specifier: specifier.to_owned(),
            binding: canonicalize(name),
        });
    }
    Ok(Stmt::VariableDeclaration {
        kind: DeclKind::Const,
        name: canonicalize(name),
        init: lower_expr(init)?,
    })
}

/// `(import name "spec")` in statement position.
fn lower_import(form: &Form) -> Result<Stmt, LowerError> {
    let elements = form.call_elements().expect("matched as call");
    if elements.len() != 3 {
        return Err(LowerError::bad_args(
            "`import` expects a binding name and a specifier string",
            form.position,
        ));
    }
    let Some(binding) = elements[1].symbol_name() else {
        return Err(LowerError::bad_args(
            format!("`import` expects a symbol binding, found {}", elements[1].description()),
            elements[1].position,
        ));
    };
    let Some(specifier) = as_plain_string(&elements[2]) else {
        return Err(LowerError::bad_args(
            "`import` expects a string specifier",
            elements[2].position,
        ));
    };
    Ok(Stmt::ImportDeclaration {
        specifier: specifier.to_owned(),
        binding: canonicalize(binding),
    })
}

/// `(export "external" local …)` or `(export ["a" x "b" y])`.
///
/// The exported name is the exact string the form requested; the local is
/// the canonicalized identifier.
fn lower_export(form: &Form) -> Result<Stmt, LowerError> {
    let elements = form.call_elements().expect("matched as call");
    let pair_forms: &[Form] = match &elements[1..] {
        [single] if single.as_list().is_some_and(|l| l.kind == ListKind::Array) => {
            &single.as_list().expect("checked above").elements
        }
        rest => rest,
    };
    if pair_forms.is_empty() || pair_forms.len() % 2 != 0 {
        return Err(LowerError::bad_args(
            "`export` expects `\"name\" local` pairs",
            form.position,
        ));
    }
    let mut exports = Vec::with_capacity(pair_forms.len() / 2);
    for pair in pair_forms.chunks_exact(2) {
        let Some(exported) = as_plain_string(&pair[0]) else {
            return Err(LowerError::bad_args(
                format!("`export` expects a string name, found {}", pair[0].description()),
                pair[0].position,
            ));
        };
        let Some(local) = pair[1].symbol_name() else {
            return Err(LowerError::bad_args(
                format!("`export` expects a local symbol, found {}", pair[1].description()),
                pair[1].position,
            ));
        };
        exports.push(ExportPair {
            local: canonicalize(local),
            exported: exported.to_owned(),
        });
    }
    Ok(Stmt::ExportDeclaration { exports })
}

/// `(enum Name M0 M1 …)` → an enum declaration; members keep their authored
/// spelling (they are data, doubling as the string values).
fn lower_enum(form: &Form) -> Result<Stmt, LowerError> {
    let elements = form.call_elements().expect("matched as call");
    if elements.len() < 2 {
        return Err(LowerError::bad_args("`enum` expects a name", form.position));
    }
    let Some(name) = elements[1].symbol_name() else {
        return Err(LowerError::bad_args(
            format!("`enum` expects a symbol name, found {}", elements[1].description()),
            elements[1].position,
        ));
    };
    let mut members = Vec::with_capacity(elements.len() - 2);
    for member in &elements[2..] {
        let Some(member_name) = member.symbol_name() else {
            return Err(LowerError::bad_args(
                format!("`enum` expects symbol members, found {}", member.description()),
                member.position,
            ));
        };
        members.push(member_name.to_owned());
    }
    Ok(Stmt::EnumDeclaration {
        name: canonicalize(name),
        members,
    })
}

/// `(defun name (params…) body…)` → a named function declaration.
fn lower_defun(form: &Form) -> Result<Stmt, LowerError> {
    let elements = form.call_elements().expect("matched as call");
    if elements.len() < 3 {
        return Err(LowerError::bad_args(
            "`defun` expects a name, a parameter list and a body",
            form.position,
        ));
    }
    let Some(name) = elements[1].symbol_name() else {
        return Err(LowerError::bad_args(
            format!("`defun` expects a symbol name, found {}", elements[1].description()),
            elements[1].position,
        ));
    };
    let function = lower_function(Some(canonicalize(name)), &elements[2], &elements[3..])?;
    Ok(Stmt::FunctionDeclaration(function))
}

/// Shared lowering for `defun` declarations and `fn` expressions.
fn lower_function(name: Option<String>, params: &Form, body: &[Form]) -> Result<FunctionDecl, LowerError> {
    let Some(param_list) = params
        .as_list()
        .filter(|l| matches!(l.kind, ListKind::Parens | ListKind::Array))
    else {
        return Err(LowerError::bad_args(
            format!("expected a parameter list, found {}", params.description()),
            params.position,
        ));
    };
    let (params, is_named_args) = lower_params(&param_list.elements, params.position)?;

    // the expander wraps bodies in a single `do`; unwrap it so the emitted
    // function body is flat
    let body_forms: Vec<&Form> = if body.len() == 1 && body[0].call_head() == Some("do") {
        body[0].call_elements().expect("matched as call")[1..].iter().collect()
    } else {
        body.iter().collect()
    };
    let body = lower_body(&body_forms)?;
    Ok(FunctionDecl {
        name,
        params,
        body,
        is_named_args,
    })
}

/// Lowers a parameter list.
///
/// Shapes: `name`, `name = default`, `name: Type`, `name: Type = default`,
/// `& rest`. Any `:`-marked name flips the declaration into named-argument
/// mode; rest parameters cannot be combined with that mode.
fn lower_params(forms: &[Form], position: CodeRange) -> Result<(SmallVec<[ParamInfo; 4]>, bool), LowerError> {
    let mut out: SmallVec<[ParamInfo; 4]> = SmallVec::new();
    let mut is_named_args = false;
    let mut has_rest = false;
    let mut index = 0;
    while index < forms.len() {
        let form = &forms[index];
        let Some(symbol) = form.as_symbol() else {
            return Err(LowerError::bad_args(
                format!("parameters must be symbols, found {}", form.description()),
                form.position,
            ));
        };
        if symbol.name == "&" {
            let Some(rest) = forms.get(index + 1).and_then(Form::symbol_name) else {
                return Err(LowerError::bad_args("`&` must be followed by a rest name", form.position));
            };
            if index + 2 != forms.len() {
                return Err(LowerError::bad_args(
                    "the rest parameter must come last",
                    forms[index + 2].position,
                ));
            }
            out.push(ParamInfo {
                name: canonicalize(rest),
                type_annotation: None,
                default_value: None,
                is_rest: true,
            });
            has_rest = true;
            break;
        }
        if let Some(marker) = symbol.named_marker() {
            is_named_args = true;
            let Some(annotation) = forms.get(index + 1).and_then(Form::symbol_name) else {
                return Err(LowerError::bad_args(
                    format!("parameter `{}` needs a type annotation", symbol.name),
                    form.position,
                ));
            };
            let mut info = ParamInfo {
                name: canonicalize(marker),
                type_annotation: Some(annotation.to_owned()),
                default_value: None,
                is_rest: false,
            };
            index += 2;
            if forms.get(index).is_some_and(|f| f.is_symbol("=")) {
                let Some(default) = forms.get(index + 1) else {
                    return Err(LowerError::bad_args("`=` needs a default value", forms[index].position));
                };
                info.default_value = Some(lower_expr(default)?);
                index += 2;
            }
            out.push(info);
            continue;
        }
        let mut info = ParamInfo::plain(canonicalize(&symbol.name));
        index += 1;
        if forms.get(index).is_some_and(|f| f.is_symbol("=")) {
            let Some(default) = forms.get(index + 1) else {
                return Err(LowerError::bad_args("`=` needs a default value", forms[index].position));
            };
            info.default_value = Some(lower_expr(default)?);
            index += 2;
        }
        out.push(info);
    }

    let mut seen = AHashSet::new();
    for param in &out {
        if !seen.insert(param.name.as_str()) {
            return Err(LowerError::bad_args(
                format!("duplicate parameter `{}`", param.name),
                position,
            ));
        }
    }
    if is_named_args && has_rest {
        return Err(LowerError::bad_args(
            "rest parameters cannot be combined with named parameters",
            position,
        ));
    }
    Ok((out, is_named_args))
}

/// Lowers a function body: every form a statement, the final expression
/// wrapped in `return`.
fn lower_body(forms: &[&Form]) -> Result<Vec<Stmt>, LowerError> {
    let mut out = Vec::with_capacity(forms.len());
    for (index, form) in forms.iter().enumerate() {
        if index + 1 == forms.len() {
            out.push(lower_tail(form)?);
        } else {
            out.push(lower_stmt(form)?);
        }
    }
    Ok(out)
}

fn lower_tail(form: &Form) -> Result<Stmt, LowerError> {
    if let Some(head) = form.call_head() {
        if head == "do" {
            let elements = form.call_elements().expect("matched as call");
            let inner: Vec<&Form> = elements[1..].iter().collect();
            return Ok(Stmt::Block(lower_body(&inner)?));
        }
        if is_statement_head(head) {
            return lower_stmt(form);
        }
    }
    Ok(Stmt::Return(Some(lower_expr(form)?)))
}

/// `(loop init test update body)` → a classical `for` statement. A `def`
/// in init position declares with `let`; the induction variable is mutated.
fn lower_loop(form: &Form) -> Result<Stmt, LowerError> {
    let elements = form.call_elements().expect("matched as call");
    if elements.len() != 5 {
        return Err(LowerError::bad_args(
            "`loop` expects init, test, update and a body",
            form.position,
        ));
    }
    let init = &elements[1];
    let init_stmt = if init.call_head() == Some("def") {
        let def_elements = init.call_elements().expect("matched as call");
        if def_elements.len() != 3 {
            return Err(LowerError::bad_args("`def` expects a name and one value", init.position));
        }
        let Some(name) = def_elements[1].symbol_name() else {
            return Err(LowerError::bad_args(
                format!("`def` expects a symbol name, found {}", def_elements[1].description()),
                def_elements[1].position,
            ));
        };
        Stmt::VariableDeclaration {
            kind: DeclKind::Let,
            name: canonicalize(name),
            init: lower_expr(&def_elements[2])?,
        }
    } else {
        Stmt::Expr(lower_expr(init)?)
    };
    let test = lower_expr(&elements[2])?;
    let update = lower_expr(&elements[3])?;
    let body = lower_loop_body(&elements[4])?;
    Ok(Stmt::For {
        init: Some(Box::new(init_stmt)),
        test: Some(test),
        update: Some(update),
        body,
    })
}

/// `(foreach x coll body)` → `coll.forEach(function (x) { body })`.
fn lower_foreach(form: &Form) -> Result<Expr, LowerError> {
    let elements = form.call_elements().expect("matched as call");
    if elements.len() != 4 {
        return Err(LowerError::bad_args(
            "`foreach` expects a variable, a collection and a body",
            form.position,
        ));
    }
    let Some(var) = elements[1].symbol_name() else {
        return Err(LowerError::bad_args(
            format!("`foreach` expects a symbol variable, found {}", elements[1].description()),
            elements[1].position,
        ));
    };
    let body = lower_loop_body(&elements[3])?;
    let callback = FunctionDecl {
        name: None,
        params: SmallVec::from_vec(vec![ParamInfo::plain(canonicalize(var))]),
        body,
        is_named_args: false,
    };
    Ok(Expr::Call {
        callee: Box::new(Expr::Member {
            object: Box::new(lower_expr(&elements[2])?),
            property: Box::new(Expr::Str("forEach".to_owned())),
            computed: false,
        }),
        arguments: vec![Expr::Function(Box::new(callback))],
        is_named_args: false,
    })
}

/// Loop bodies are statement sequences without a synthesized return.
fn lower_loop_body(body: &Form) -> Result<Vec<Stmt>, LowerError> {
    if body.call_head() == Some("do") {
        let elements = body.call_elements().expect("matched as call");
        elements[1..].iter().map(lower_stmt).collect()
    } else {
        Ok(vec![lower_stmt(body)?])
    }
}

fn lower_expr(form: &Form) -> Result<Expr, LowerError> {
    match &form.value {
        FormValue::Literal(literal) => Ok(lower_literal(literal)),
        FormValue::Symbol(symbol) => Ok(lower_symbol(symbol)),
        FormValue::List(list) => match list.kind {
            ListKind::Array => {
                let elements = list.elements.iter().map(lower_expr).collect::<Result<Vec<_>, _>>()?;
                Ok(Expr::Array(elements))
            }
            ListKind::Map => lower_object(&list.elements, form.position),
            ListKind::Set => {
                let elements = list.elements.iter().map(lower_expr).collect::<Result<Vec<_>, _>>()?;
                Ok(Expr::New {
                    callee: Box::new(Expr::identifier("Set")),
                    arguments: vec![Expr::Array(elements)],
                })
            }
            ListKind::Parens => lower_call(form, &list.elements),
        },
    }
}

fn lower_literal(literal: &Literal) -> Expr {
    match literal {
        Literal::Num(n) => Expr::Num(*n),
        Literal::Str { value, interpolations } => {
            if interpolations.is_empty() {
                Expr::Str(value.clone())
            } else {
                let idents = interpolations
                    .iter()
                    .map(|span| {
                        let inner = &value[span.start as usize + 1..span.end as usize - 1];
                        lower_symbol(&Symbol::new(inner))
                    })
                    .collect();
                Expr::template(value, interpolations, idents)
            }
        }
        Literal::Bool(b) => Expr::Bool(*b),
        Literal::Nil => Expr::Null,
    }
}

/// Symbols lower to identifiers in canonical orthography. Keywords lower to
/// their string value; `js/` interop names pass through verbatim.
fn lower_symbol(symbol: &Symbol) -> Expr {
    if symbol.is_keyword() {
        return Expr::Str(symbol.name[1..].to_owned());
    }
    if let Some(rest) = symbol.name.strip_prefix("js/") {
        return Expr::Identifier {
            name: rest.to_owned(),
            is_js_access: true,
        };
    }
    Expr::Identifier {
        name: canonicalize(&symbol.name),
        is_js_access: false,
    }
}

/// Map literals lower to object literals in authored order.
///
/// Keys must be string literals or symbols; named-argument keys are the one
/// place where keys are identifiers, handled separately in `lower_call`.
fn lower_object(elements: &[Form], position: CodeRange) -> Result<Expr, LowerError> {
    if elements.len() % 2 != 0 {
        return Err(LowerError::bad_key("map literals need `key: value` pairs", position));
    }
    let mut properties = Vec::with_capacity(elements.len() / 2);
    for pair in elements.chunks_exact(2) {
        let key = match &pair[0].value {
            FormValue::Literal(Literal::Str { value, .. }) => value.clone(),
            FormValue::Symbol(symbol) if symbol.is_keyword() => symbol.name[1..].to_owned(),
            FormValue::Symbol(symbol) => symbol.name.clone(),
            _ => {
                return Err(LowerError::bad_key(
                    format!("map keys must be strings or symbols, found {}", pair[0].description()),
                    pair[0].position,
                ));
            }
        };
        properties.push(Property {
            key,
            value: lower_expr(&pair[1])?,
        });
    }
    Ok(Expr::Object(properties))
}

fn binary_op(name: &str) -> Option<BinaryOp> {
    let op = match name {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Rem,
        "=" => BinaryOp::Eq,
        "!=" => BinaryOp::NotEq,
        "<" => BinaryOp::Lt,
        "<=" => BinaryOp::LtE,
        ">" => BinaryOp::Gt,
        ">=" => BinaryOp::GtE,
        "&&" => BinaryOp::And,
        "||" => BinaryOp::Or,
        _ => return None,
    };
    Some(op)
}

fn lower_call(form: &Form, elements: &[Form]) -> Result<Expr, LowerError> {
    let Some((head, args)) = elements.split_first() else {
        // `()` is nil
        return Ok(Expr::Null);
    };

    if let Some(head_name) = head.symbol_name() {
        if let Some(op) = binary_op(head_name) {
            return lower_operator(op, head_name, args, form.position);
        }
        match head_name {
            "!" => {
                if args.len() != 1 {
                    return Err(LowerError::bad_args("`!` expects exactly one argument", form.position));
                }
                return Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(lower_expr(&args[0])?),
                });
            }
            "if" => {
                if !matches!(args.len(), 2 | 3) {
                    return Err(LowerError::bad_args(
                        "`if` expects a test, a consequent and an optional alternate",
                        form.position,
                    ));
                }
                let alternate = match args.get(2) {
                    Some(alternate) => lower_expr(alternate)?,
                    None => Expr::Null,
                };
                return Ok(Expr::Conditional {
                    test: Box::new(lower_expr(&args[0])?),
                    consequent: Box::new(lower_expr(&args[1])?),
                    alternate: Box::new(alternate),
                });
            }
            "fn" => return lower_fn(args, form.position),
            "do" => return lower_do_expr(args),
            "get" => {
                if args.len() != 2 {
                    return Err(LowerError::bad_args(
                        "`get` expects an object and a key",
                        form.position,
                    ));
                }
                return lower_get(&args[0], &args[1]);
            }
            "new" => {
                let Some((callee, rest)) = args.split_first() else {
                    return Err(LowerError::bad_args("`new` expects a constructor", form.position));
                };
                let arguments = rest.iter().map(lower_expr).collect::<Result<Vec<_>, _>>()?;
                return Ok(Expr::New {
                    callee: Box::new(lower_expr(callee)?),
                    arguments,
                });
            }
            "set" => {
                if args.len() != 2 {
                    return Err(LowerError::bad_args(
                        "`set` expects a target and a value",
                        form.position,
                    ));
                }
                return Ok(Expr::Assignment {
                    target: Box::new(lower_expr(&args[0])?),
                    value: Box::new(lower_expr(&args[1])?),
                });
            }
            "quote" => {
                if args.len() != 1 {
                    return Err(LowerError::bad_args("`quote` expects exactly one form", form.position));
                }
                return lower_quoted(&args[0]);
            }
            "def" | "defun" | "enum" | "export" | "import" | "loop" | "foreach" => {
                return Err(LowerError::unknown_form(head_name, form.position));
            }
            "quasiquote" | "unquote" | "unquote-splicing" | "defmacro" => {
                return Err(LowerError::unknown_form(head_name, form.position));
            }
            _ => {}
        }
    }

    // plain call, possibly with named arguments
    let callee = Box::new(lower_expr(head)?);
    let named = args
        .iter()
        .any(|arg| arg.as_symbol().and_then(Symbol::named_marker).is_some());
    if named {
        if args.len() % 2 != 0 {
            return Err(LowerError::bad_args(
                "named arguments must come in `name: value` pairs",
                form.position,
            ));
        }
        let mut properties = Vec::with_capacity(args.len() / 2);
        for pair in args.chunks_exact(2) {
            let Some(marker) = pair[0].as_symbol().and_then(Symbol::named_marker) else {
                return Err(LowerError::bad_args(
                    "positional arguments cannot mix with named arguments",
                    pair[0].position,
                ));
            };
            properties.push(Property {
                // these keys name parameters, so they canonicalize like
                // identifiers
                key: canonicalize(marker),
                value: lower_expr(&pair[1])?,
            });
        }
        return Ok(Expr::Call {
            callee,
            arguments: vec![Expr::Object(properties)],
            is_named_args: true,
        });
    }

    let arguments = args.iter().map(lower_expr).collect::<Result<Vec<_>, _>>()?;
    Ok(Expr::Call {
        callee,
        arguments,
        is_named_args: false,
    })
}

/// Operator calls follow Lisp conventions for 0–1 arguments and left-fold
/// longer chains.
fn lower_operator(op: BinaryOp, name: &str, args: &[Form], position: CodeRange) -> Result<Expr, LowerError> {
    match (op, args.len()) {
        (BinaryOp::Add, 0) => return Ok(Expr::Num(0.0)),
        (BinaryOp::Mul, 0) => return Ok(Expr::Num(1.0)),
        (BinaryOp::Add | BinaryOp::Mul, 1) => return lower_expr(&args[0]),
        (BinaryOp::Sub, 1) => {
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(lower_expr(&args[0])?),
            });
        }
        (BinaryOp::Div, 1) => {
            return Ok(Expr::Binary {
                op: BinaryOp::Div,
                left: Box::new(Expr::Num(1.0)),
                right: Box::new(lower_expr(&args[0])?),
            });
        }
        (_, 0 | 1) => {
            return Err(LowerError::bad_args(
                format!("`{name}` expects at least two arguments"),
                position,
            ));
        }
        _ => {}
    }
    let mut iter = args.iter();
    let mut acc = lower_expr(iter.next().expect("length checked above"))?;
    for arg in iter {
        acc = Expr::Binary {
            op,
            left: Box::new(acc),
            right: Box::new(lower_expr(arg)?),
        };
    }
    Ok(acc)
}

/// `(fn (params…) body…)`, optionally `(fn name (params…) body…)`.
fn lower_fn(args: &[Form], position: CodeRange) -> Result<Expr, LowerError> {
    let (name, params, body) = match args {
        [params, body @ ..] if params.as_list().is_some() => (None, params, body),
        [name, params, body @ ..] if name.as_symbol().is_some() => {
            (name.symbol_name().map(canonicalize), params, body)
        }
        _ => {
            return Err(LowerError::bad_args(
                "`fn` expects a parameter list and a body",
                position,
            ));
        }
    };
    let function = lower_function(name, params, body)?;
    Ok(Expr::Function(Box::new(function)))
}

/// `do` in expression position: a single form passes through; a longer
/// sequence becomes an immediately-invoked anonymous function.
fn lower_do_expr(args: &[Form]) -> Result<Expr, LowerError> {
    match args {
        [] => Ok(Expr::Null),
        [only] => lower_expr(only),
        _ => {
            let forms: Vec<&Form> = args.iter().collect();
            let body = lower_body(&forms)?;
            let function = FunctionDecl {
                name: None,
                params: SmallVec::new(),
                body,
                is_named_args: false,
            };
            Ok(Expr::Call {
                callee: Box::new(Expr::Function(Box::new(function))),
                arguments: Vec::new(),
                is_named_args: false,
            })
        }
    }
}

/// `(get o k)`: a string key that is a valid JavaScript identifier becomes
/// dot access; everything else is computed access.
fn lower_get(object: &Form, key: &Form) -> Result<Expr, LowerError> {
    let object = Box::new(lower_expr(object)?);
    if let Some(key_str) = as_plain_string(key) {
        return Ok(Expr::Member {
            object,
            property: Box::new(Expr::Str(key_str.to_owned())),
            computed: !is_valid_js_identifier(key_str),
        });
    }
    Ok(Expr::Member {
        object,
        property: Box::new(lower_expr(key)?),
        computed: true,
    })
}

/// Quoted data: symbols become strings, lists become arrays, literals stay
/// themselves.
fn lower_quoted(form: &Form) -> Result<Expr, LowerError> {
    match &form.value {
        FormValue::Literal(literal) => Ok(lower_literal(literal)),
        FormValue::Symbol(symbol) => Ok(Expr::Str(symbol.name.clone())),
        FormValue::List(list) => match list.kind {
            ListKind::Map => {
                if list.elements.len() % 2 != 0 {
                    return Err(LowerError::bad_key(
                        "map literals need `key: value` pairs",
                        form.position,
                    ));
                }
                let mut properties = Vec::with_capacity(list.elements.len() / 2);
                for pair in list.elements.chunks_exact(2) {
                    let key = match &pair[0].value {
                        FormValue::Literal(Literal::Str { value, .. }) => value.clone(),
                        FormValue::Symbol(symbol) => symbol.name.clone(),
                        _ => {
                            return Err(LowerError::bad_key(
                                format!("map keys must be strings or symbols, found {}", pair[0].description()),
                                pair[0].position,
                            ));
                        }
                    };
                    properties.push(Property {
                        key,
                        value: lower_quoted(&pair[1])?,
                    });
                }
                Ok(Expr::Object(properties))
            }
            ListKind::Set => {
                let elements = list
                    .elements
                    .iter()
                    .map(lower_quoted)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Expr::New {
                    callee: Box::new(Expr::identifier("Set")),
                    arguments: vec![Expr::Array(elements)],
                })
            }
            ListKind::Parens | ListKind::Array => {
                let elements = list
                    .elements
                    .iter()
                    .map(lower_quoted)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Expr::Array(elements))
            }
        },
    }
}

/// The value of a plain string literal (no interpolation spans).
fn as_plain_string(form: &Form) -> Option<&str> {
    match &form.value {
        FormValue::Literal(Literal::Str { value, interpolations }) if interpolations.is_empty() => {
            Some(value)
        }
        _ => None,
    }
}
