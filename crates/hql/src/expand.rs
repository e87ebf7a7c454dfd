use std::{borrow::Cow, fmt};

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;

use crate::{
    forms::{Form, FormValue, ListKind, Literal},
    lex::CodeRange,
};

/// Default cap on expansion recursion depth.
pub const DEFAULT_RECURSION_LIMIT: usize = 200;
/// Default cap on head rewrites of a single form, the fixed-point budget
/// that stops non-terminating user macros.
pub const DEFAULT_ITERATION_LIMIT: usize = 1_000;

/// Errors produced during macro expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpandError {
    /// An unquote referenced a name bound by no macro parameter.
    UnknownMacro { name: String, position: CodeRange },
    MacroArityMismatch {
        name: String,
        expected: Cow<'static, str>,
        given: usize,
        position: CodeRange,
    },
    MalformedTemplate {
        message: Cow<'static, str>,
        position: CodeRange,
    },
    /// The recursion-depth or fixed-point iteration budget ran out.
    RecursionLimitExceeded { position: CodeRange },
    DuplicateParameter { name: String, position: CodeRange },
}

impl ExpandError {
    fn unknown_macro(name: impl Into<String>, position: CodeRange) -> Self {
        Self::UnknownMacro {
            name: name.into(),
            position,
        }
    }

    fn arity(
        name: impl Into<String>,
        expected: impl Into<Cow<'static, str>>,
        given: usize,
        position: CodeRange,
    ) -> Self {
        Self::MacroArityMismatch {
            name: name.into(),
            expected: expected.into(),
            given,
            position,
        }
    }

    fn malformed(message: impl Into<Cow<'static, str>>, position: CodeRange) -> Self {
        Self::MalformedTemplate {
            message: message.into(),
            position,
        }
    }

    fn limit(position: CodeRange) -> Self {
        Self::RecursionLimitExceeded { position }
    }

    fn duplicate(name: impl Into<String>, position: CodeRange) -> Self {
        Self::DuplicateParameter {
            name: name.into(),
            position,
        }
    }

    pub fn position(&self) -> CodeRange {
        match self {
            Self::UnknownMacro { position, .. }
            | Self::MacroArityMismatch { position, .. }
            | Self::MalformedTemplate { position, .. }
            | Self::RecursionLimitExceeded { position }
            | Self::DuplicateParameter { position, .. } => *position,
        }
    }
}

impl fmt::Display for ExpandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMacro { name, position } => {
                write!(f, "unquote references unknown binding `{name}` at {}", position.start)
            }
            Self::MacroArityMismatch {
                name,
                expected,
                given,
                position,
            } => {
                write!(
                    f,
                    "`{name}` expects {expected}, got {given} at {}",
                    position.start
                )
            }
            Self::MalformedTemplate { message, position } => {
                write!(f, "{message} at {}", position.start)
            }
            Self::RecursionLimitExceeded { position } => {
                write!(f, "macro expansion limit exceeded at {}", position.start)
            }
            Self::DuplicateParameter { name, position } => {
                write!(f, "duplicate macro parameter `{name}` at {}", position.start)
            }
        }
    }
}

impl std::error::Error for ExpandError {}

/// The built-in rewrite rules.
///
/// Each rewrites one step into the core-form language consumed by lowering
/// (`def`, `set`, `defun`, `fn`, `do`, `if`, `loop`, `foreach`, `enum`,
/// `get`, `new`, `import`, `export`, `quote`, operator calls).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinMacro {
    Defn,
    Fx,
    Defenum,
    Let,
    Cond,
    For,
    Thread,
    When,
    Unless,
    And,
    Or,
    Not,
}

/// A user rule installed by `defmacro`.
#[derive(Debug, Clone, PartialEq)]
pub struct UserMacro {
    pub params: Vec<String>,
    pub rest: Option<String>,
    pub template: Form,
    pub position: CodeRange,
}

/// A rewrite rule: built-in or user-defined. A macro name resolves to
/// exactly one rule at any expansion step; redefinition replaces.
#[derive(Debug, Clone, PartialEq)]
pub enum MacroRule {
    Builtin(BuiltinMacro),
    User(UserMacro),
}

/// What a macro parameter is bound to during template realization.
#[derive(Debug, Clone)]
enum Binding {
    One(Form),
    /// The rest parameter: the remaining argument forms in order.
    Seq(Vec<Form>),
}

type Env = AHashMap<String, Binding>;
type Renames = AHashMap<String, String>;

/// Fixed-point, top-down macro expander.
///
/// The macro table is scoped to one compilation unit; create a fresh
/// expander per `compile` call.
#[derive(Debug, Clone)]
pub struct Expander {
    macros: IndexMap<String, MacroRule>,
    gensym_counter: u32,
    recursion_limit: usize,
    iteration_limit: usize,
}

impl Default for Expander {
    fn default() -> Self {
        Self::new(DEFAULT_RECURSION_LIMIT, DEFAULT_ITERATION_LIMIT)
    }
}

impl Expander {
    pub fn new(recursion_limit: usize, iteration_limit: usize) -> Self {
        let mut macros = IndexMap::new();
        for (name, builtin) in [
            ("defn", BuiltinMacro::Defn),
            ("fx", BuiltinMacro::Fx),
            ("defenum", BuiltinMacro::Defenum),
            ("let", BuiltinMacro::Let),
            ("cond", BuiltinMacro::Cond),
            ("for", BuiltinMacro::For),
            ("->", BuiltinMacro::Thread),
            ("when", BuiltinMacro::When),
            ("unless", BuiltinMacro::Unless),
            ("and", BuiltinMacro::And),
            ("or", BuiltinMacro::Or),
            ("not", BuiltinMacro::Not),
        ] {
            macros.insert(name.to_owned(), MacroRule::Builtin(builtin));
        }
        Self {
            macros,
            gensym_counter: 0,
            recursion_limit,
            iteration_limit,
        }
    }

    /// True when `name` currently resolves to a macro rule.
    pub fn is_macro(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    /// The currently installed macro names, in installation order.
    pub fn macro_names(&self) -> impl Iterator<Item = &str> {
        self.macros.keys().map(String::as_str)
    }

    /// Expands a whole program. Top-level `defmacro` forms install their
    /// rule and vanish from the output.
    pub fn expand_program(&mut self, forms: Vec<Form>) -> Result<Vec<Form>, ExpandError> {
        let mut out = Vec::with_capacity(forms.len());
        for form in forms {
            if form.call_head() == Some("defmacro") {
                self.install_macro(&form)?;
                continue;
            }
            out.push(self.expand_form(form, 0)?);
        }
        Ok(out)
    }

    /// Expands one form: rewrites macro heads to fixed point, then recurses
    /// into children. `quote` blocks expansion of its payload.
    pub fn expand_form(&mut self, form: Form, depth: usize) -> Result<Form, ExpandError> {
        if depth > self.recursion_limit {
            return Err(ExpandError::limit(form.position));
        }
        let form = self.rewrite_head(form)?;
        if form.call_head() == Some("quote") {
            return Ok(form);
        }
        if form.call_head() == Some("quasiquote") {
            return self.expand_outer_quasiquote(&form);
        }
        if form.call_head() == Some("defmacro") {
            let position = form.position;
            self.install_macro(&form)?;
            return Ok(Form::nil(position));
        }
        if matches!(form.call_head(), Some("defun" | "fn")) {
            return self.expand_function(form, depth);
        }
        match form.value {
            FormValue::List(list) => {
                let elements = list
                    .elements
                    .into_iter()
                    .map(|element| self.expand_form(element, depth + 1))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Form::list(list.kind, elements, form.position))
            }
            _ => Ok(form),
        }
    }

    /// Expands a `defun`/`fn` form without treating its parameter list as
    /// expandable: binder names stay verbatim even when they shadow a macro,
    /// and only default-value forms inside the list are expanded.
    fn expand_function(&mut self, form: Form, depth: usize) -> Result<Form, ExpandError> {
        let position = form.position;
        let FormValue::List(list) = form.value else {
            return Ok(form);
        };
        let kind = list.kind;
        // `(defun name (params…) …)` / `(fn name (params…) …)` put the list
        // at index 2; anonymous `(fn (params…) …)` at index 1
        let param_index = if list.elements.get(1).and_then(Form::as_list).is_some() {
            1
        } else {
            2
        };
        let mut elements = Vec::with_capacity(list.elements.len());
        for (index, element) in list.elements.into_iter().enumerate() {
            if index == 0 {
                elements.push(element);
            } else if index == param_index {
                elements.push(self.expand_param_defaults(element, depth)?);
            } else {
                elements.push(self.expand_form(element, depth + 1)?);
            }
        }
        Ok(Form::list(kind, elements, position))
    }

    /// Expands only the list-shaped elements of a parameter list (default
    /// values); names, markers, type annotations and `=` stay untouched.
    fn expand_param_defaults(&mut self, params: Form, depth: usize) -> Result<Form, ExpandError> {
        let position = params.position;
        let FormValue::List(list) = params.value else {
            return Ok(params);
        };
        let kind = list.kind;
        let elements = list
            .elements
            .into_iter()
            .map(|element| {
                if element.as_list().is_some() {
                    self.expand_form(element, depth + 1)
                } else {
                    Ok(element)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Form::list(kind, elements, position))
    }

    /// Rewrites the head of `form` while it names a macro, bounded by the
    /// iteration budget.
    fn rewrite_head(&mut self, mut form: Form) -> Result<Form, ExpandError> {
        let mut iterations = 0usize;
        loop {
            let rule = match form.call_head() {
                Some(head) => self.macros.get(head).cloned(),
                None => None,
            };
            let Some(rule) = rule else {
                return Ok(form);
            };
            iterations += 1;
            if iterations > self.iteration_limit {
                return Err(ExpandError::limit(form.position));
            }
            form = match rule {
                MacroRule::Builtin(builtin) => self.rewrite_builtin(builtin, form)?,
                MacroRule::User(user) => self.apply_user(&user, form)?,
            };
        }
    }

    fn gensym(&mut self, base: &str) -> String {
        let n = self.gensym_counter;
        self.gensym_counter += 1;
        format!("{base}__g{n}")
    }

    // ----- built-in rewrites -------------------------------------------------

    fn rewrite_builtin(&mut self, builtin: BuiltinMacro, form: Form) -> Result<Form, ExpandError> {
        match builtin {
            BuiltinMacro::Defn => Self::rewrite_defn(form, false),
            BuiltinMacro::Fx => Self::rewrite_defn(form, true),
            BuiltinMacro::Defenum => Self::rewrite_defenum(form),
            BuiltinMacro::Let => Self::rewrite_let(form),
            BuiltinMacro::Cond => Self::rewrite_cond(form),
            BuiltinMacro::For => self.rewrite_for(form),
            BuiltinMacro::Thread => Self::rewrite_thread(form),
            BuiltinMacro::When => Self::rewrite_when(form),
            BuiltinMacro::Unless => Self::rewrite_unless(form),
            BuiltinMacro::And => Self::rewrite_variadic_logic(form, "&&", Literal::Bool(true)),
            BuiltinMacro::Or => Self::rewrite_variadic_logic(form, "||", Literal::Bool(false)),
            BuiltinMacro::Not => Self::rewrite_not(form),
        }
    }

    fn into_call_parts(form: Form) -> (CodeRange, Vec<Form>) {
        let position = form.position;
        match form.value {
            FormValue::List(list) => (position, list.elements),
            // rewrite_builtin is only reached through call_head()
            _ => (position, Vec::new()),
        }
    }

    /// `(defn name (params…) body…)` → `(defun name (params…) (do body…))`.
    ///
    /// For `fx`, a `(-> T)` return clause after the parameter list is
    /// validated and dropped: the annotation is parse-only and `(-> Void)`
    /// means no return type.
    fn rewrite_defn(form: Form, typed: bool) -> Result<Form, ExpandError> {
        let (position, elements) = Self::into_call_parts(form);
        let name_str = if typed { "fx" } else { "defn" };
        if elements.len() < 3 {
            return Err(ExpandError::arity(
                name_str,
                "a name, a parameter list and a body",
                elements.len() - 1,
                position,
            ));
        }
        let mut elements = elements.into_iter();
        elements.next(); // head
        let name = elements.next().expect("length checked above");
        if name.as_symbol().is_none() {
            return Err(ExpandError::malformed(
                format!("`{name_str}` expects a symbol name, found {}", name.description()),
                name.position,
            ));
        }
        let params = elements.next().expect("length checked above");
        if !matches!(
            params.as_list().map(|l| l.kind),
            Some(ListKind::Parens | ListKind::Array)
        ) {
            return Err(ExpandError::malformed(
                format!("`{name_str}` expects a parameter list, found {}", params.description()),
                params.position,
            ));
        }
        let mut body: Vec<Form> = elements.collect();
        if typed {
            if let Some(first) = body.first() {
                if first.call_head() == Some("->") {
                    let clause = body.remove(0);
                    let clause_elements = clause.call_elements().expect("checked to be a call");
                    if clause_elements.len() != 2 || clause_elements[1].as_symbol().is_none() {
                        return Err(ExpandError::arity(
                            "->",
                            "a single return type",
                            clause_elements.len() - 1,
                            clause.position,
                        ));
                    }
                }
            }
        }
        let do_position = body.first().map_or(position, |f| f.position);
        let do_form = Form::call("do", body, do_position);
        Ok(Form::call("defun", vec![name, params, do_form], position))
    }

    /// `(defenum Name M0 M1 …)` → `(enum Name M0 M1 …)`.
    fn rewrite_defenum(form: Form) -> Result<Form, ExpandError> {
        let (position, elements) = Self::into_call_parts(form);
        if elements.len() < 2 {
            return Err(ExpandError::arity("defenum", "a name", 0, position));
        }
        for member in &elements[1..] {
            if member.as_symbol().is_none() {
                return Err(ExpandError::malformed(
                    format!("`defenum` expects symbol members, found {}", member.description()),
                    member.position,
                ));
            }
        }
        let rest = elements.into_iter().skip(1).collect();
        Ok(Form::call("enum", rest, position))
    }

    /// `(let [b0 v0 …] body…)` → `(do (def b0 v0) … body…)`.
    fn rewrite_let(form: Form) -> Result<Form, ExpandError> {
        let (position, mut elements) = Self::into_call_parts(form);
        if elements.len() < 2 {
            return Err(ExpandError::arity("let", "a binding vector", 0, position));
        }
        let body: Vec<Form> = elements.split_off(2);
        let bindings = elements.pop().expect("length checked above");
        let Some(list) = bindings.as_list().filter(|l| l.kind == ListKind::Array) else {
            return Err(ExpandError::malformed(
                format!("`let` expects a `[name value …]` vector, found {}", bindings.description()),
                bindings.position,
            ));
        };
        if list.elements.len() % 2 != 0 {
            return Err(ExpandError::arity(
                "let",
                "an even number of binding forms",
                list.elements.len(),
                bindings.position,
            ));
        }
        let mut out = Vec::with_capacity(list.elements.len() / 2 + body.len());
        for pair in list.elements.chunks_exact(2) {
            let name = &pair[0];
            if name.as_symbol().is_none() {
                return Err(ExpandError::malformed(
                    format!("`let` binds symbols, found {}", name.description()),
                    name.position,
                ));
            }
            out.push(Form::call(
                "def",
                vec![name.clone(), pair[1].clone()],
                name.position.to(pair[1].position),
            ));
        }
        out.extend(body);
        Ok(Form::call("do", out, position))
    }

    /// `(cond c0 e0 c1 e1 …)` → right-nested `(if …)`; a final `true` or
    /// `:else` test becomes the fall-through alternate.
    fn rewrite_cond(form: Form) -> Result<Form, ExpandError> {
        let (position, elements) = Self::into_call_parts(form);
        let clauses = &elements[1..];
        if clauses.len() % 2 != 0 {
            return Err(ExpandError::arity(
                "cond",
                "test/result pairs",
                clauses.len(),
                position,
            ));
        }
        let mut acc = Form::nil(position);
        let mut pairs: Vec<(&Form, &Form)> = clauses.chunks_exact(2).map(|c| (&c[0], &c[1])).collect();
        let has_default = pairs
            .last()
            .is_some_and(|(test, _)| test.is_true_literal() || test.is_symbol(":else"));
        if has_default {
            let (_, expr) = pairs.pop().expect("checked non-empty above");
            acc = expr.clone();
        }
        for (test, expr) in pairs.into_iter().rev() {
            let clause_position = test.position.to(expr.position);
            acc = Form::call("if", vec![test.clone(), expr.clone(), acc], clause_position);
        }
        Ok(acc)
    }

    /// The three `for` shapes:
    /// `[x coll]` → `foreach`, `[x (range …)]` → counted `loop`,
    /// `[init test update]` → classical `loop`.
    fn rewrite_for(&mut self, form: Form) -> Result<Form, ExpandError> {
        let (position, mut elements) = Self::into_call_parts(form);
        if elements.len() < 2 {
            return Err(ExpandError::arity("for", "a binding vector and a body", 0, position));
        }
        let body: Vec<Form> = elements.split_off(2);
        let binding = elements.pop().expect("length checked above");
        let Some(binding_list) = binding.as_list().filter(|l| l.kind == ListKind::Array) else {
            return Err(ExpandError::malformed(
                format!("`for` expects a `[…]` binding vector, found {}", binding.description()),
                binding.position,
            ));
        };
        let do_position = body.first().map_or(position, |f| f.position);
        let do_form = Form::call("do", body, do_position);

        match binding_list.elements.as_slice() {
            [var, seq] if var.as_symbol().is_some() && seq.call_head() == Some("range") => {
                self.rewrite_counted_for(var, seq, do_form, position)
            }
            [var, seq] if var.as_symbol().is_some() => Ok(Form::call(
                "foreach",
                vec![var.clone(), seq.clone(), do_form],
                position,
            )),
            [init, test, update] => Ok(Form::call(
                "loop",
                vec![init.clone(), test.clone(), update.clone(), do_form],
                position,
            )),
            other => Err(ExpandError::arity(
                "for",
                "`[x coll]`, `[x (range …)]` or `[init test update]`",
                other.len(),
                binding.position,
            )),
        }
    }

    /// `(for [x (range …)] body)` → a counted `loop`. Non-trivial range
    /// bounds are hoisted into gensym bindings so they evaluate once.
    fn rewrite_counted_for(
        &mut self,
        var: &Form,
        range: &Form,
        do_form: Form,
        position: CodeRange,
    ) -> Result<Form, ExpandError> {
        let range_elements = range.call_elements().expect("checked to be a range call");
        let args = &range_elements[1..];
        let (start, end, step) = match args {
            [end] => (Form::num(0.0, range.position), end.clone(), Form::num(1.0, range.position)),
            [start, end] => (start.clone(), end.clone(), Form::num(1.0, range.position)),
            [start, end, step] => (start.clone(), end.clone(), step.clone()),
            other => {
                return Err(ExpandError::arity(
                    "range",
                    "one to three bounds",
                    other.len(),
                    range.position,
                ));
            }
        };

        let mut hoisted = Vec::new();
        let mut hoist = |this: &mut Self, form: Form, base: &str| -> Form {
            if form.as_list().is_some() {
                let name = this.gensym(base);
                let symbol = Form::symbol(name, form.position);
                hoisted.push(Form::call("def", vec![symbol.clone(), form.clone()], form.position));
                symbol
            } else {
                form
            }
        };
        let end = hoist(self, end, "$end");
        let step = hoist(self, step, "$step");

        let init = Form::call("def", vec![var.clone(), start], position);
        let test = Form::call("<", vec![var.clone(), end], position);
        let next = Form::call("+", vec![var.clone(), step], position);
        let update = Form::call("set", vec![var.clone(), next], position);
        let loop_form = Form::call("loop", vec![init, test, update, do_form], position);
        if hoisted.is_empty() {
            Ok(loop_form)
        } else {
            hoisted.push(loop_form);
            Ok(Form::call("do", hoisted, position))
        }
    }

    /// `(-> x (f a) g)` → `(g (f x a))`.
    fn rewrite_thread(form: Form) -> Result<Form, ExpandError> {
        let (position, elements) = Self::into_call_parts(form);
        if elements.len() < 2 {
            return Err(ExpandError::arity("->", "an initial value", 0, position));
        }
        let mut elements = elements.into_iter();
        elements.next(); // head
        let mut acc = elements.next().expect("length checked above");
        for stage in elements {
            let stage_position = acc.position.to(stage.position);
            let position = stage.position;
            acc = match stage.value {
                FormValue::List(mut list) if list.kind == ListKind::Parens && !list.elements.is_empty() => {
                    list.elements.insert(1, acc);
                    Form::list(ListKind::Parens, list.elements, stage_position)
                }
                FormValue::Symbol(symbol) => Form::list(
                    ListKind::Parens,
                    vec![Form::new(position, FormValue::Symbol(symbol)), acc],
                    stage_position,
                ),
                other => {
                    let stage = Form::new(position, other);
                    return Err(ExpandError::malformed(
                        format!("`->` stages must be calls or symbols, found {}", stage.description()),
                        position,
                    ));
                }
            };
        }
        Ok(acc)
    }

    /// `(when c body…)` → `(if c (do body…))`.
    fn rewrite_when(form: Form) -> Result<Form, ExpandError> {
        let (position, mut elements) = Self::into_call_parts(form);
        if elements.len() < 2 {
            return Err(ExpandError::arity("when", "a test and a body", 0, position));
        }
        let body = elements.split_off(2);
        let test = elements.pop().expect("length checked above");
        let do_position = body.first().map_or(position, |f| f.position);
        let do_form = Form::call("do", body, do_position);
        Ok(Form::call("if", vec![test, do_form], position))
    }

    /// `(unless c body…)` → `(if c nil (do body…))`.
    fn rewrite_unless(form: Form) -> Result<Form, ExpandError> {
        let (position, mut elements) = Self::into_call_parts(form);
        if elements.len() < 2 {
            return Err(ExpandError::arity("unless", "a test and a body", 0, position));
        }
        let body = elements.split_off(2);
        let test = elements.pop().expect("length checked above");
        let do_position = body.first().map_or(position, |f| f.position);
        let do_form = Form::call("do", body, do_position);
        Ok(Form::call("if", vec![test, Form::nil(position), do_form], position))
    }

    /// `and`/`or`: zero arguments yield the unit, one argument passes
    /// through, more become an operator call that lowering left-folds.
    fn rewrite_variadic_logic(form: Form, op: &str, unit: Literal) -> Result<Form, ExpandError> {
        let (position, mut elements) = Self::into_call_parts(form);
        match elements.len() {
            1 => Ok(Form::literal(unit, position)),
            2 => Ok(elements.pop().expect("length checked above")),
            _ => {
                let args = elements.into_iter().skip(1).collect();
                Ok(Form::call(op, args, position))
            }
        }
    }

    /// `(not x)` → `(! x)`.
    fn rewrite_not(form: Form) -> Result<Form, ExpandError> {
        let (position, elements) = Self::into_call_parts(form);
        if elements.len() != 2 {
            return Err(ExpandError::arity("not", "exactly one argument", elements.len() - 1, position));
        }
        let arg = elements.into_iter().nth(1).expect("length checked above");
        Ok(Form::call("!", vec![arg], position))
    }

    // ----- user macros -------------------------------------------------------

    /// Installs the rule of a `(defmacro name (params…) template)` form.
    fn install_macro(&mut self, form: &Form) -> Result<(), ExpandError> {
        let position = form.position;
        let elements = form.call_elements().expect("caller matched the defmacro head");
        if elements.len() != 4 {
            return Err(ExpandError::arity(
                "defmacro",
                "a name, a parameter list and one template",
                elements.len() - 1,
                position,
            ));
        }
        let Some(name) = elements[1].symbol_name() else {
            return Err(ExpandError::malformed(
                format!("`defmacro` expects a symbol name, found {}", elements[1].description()),
                elements[1].position,
            ));
        };
        let Some(param_list) = elements[2]
            .as_list()
            .filter(|l| matches!(l.kind, ListKind::Parens | ListKind::Array))
        else {
            return Err(ExpandError::malformed(
                format!(
                    "`defmacro` expects a parameter list, found {}",
                    elements[2].description()
                ),
                elements[2].position,
            ));
        };

        let mut params = Vec::new();
        let mut rest = None;
        let mut seen = AHashSet::new();
        let mut pending_rest = false;
        for param in &param_list.elements {
            let Some(symbol) = param.as_symbol() else {
                return Err(ExpandError::malformed(
                    format!("macro parameters must be symbols, found {}", param.description()),
                    param.position,
                ));
            };
            if rest.is_some() {
                return Err(ExpandError::malformed(
                    "the rest parameter must come last",
                    param.position,
                ));
            }
            let bound_name = if pending_rest {
                pending_rest = false;
                Some(symbol.name.clone())
            } else if symbol.name == "&" {
                pending_rest = true;
                None
            } else if let Some(stripped) = symbol.name.strip_prefix('&') {
                Some(stripped.to_owned())
            } else {
                if !seen.insert(symbol.name.clone()) {
                    return Err(ExpandError::duplicate(symbol.name.clone(), param.position));
                }
                params.push(symbol.name.clone());
                None
            };
            if let Some(bound_name) = bound_name {
                if !seen.insert(bound_name.clone()) {
                    return Err(ExpandError::duplicate(bound_name, param.position));
                }
                rest = Some(bound_name);
            }
        }
        if pending_rest {
            return Err(ExpandError::malformed("`&` must be followed by a name", position));
        }

        self.macros.insert(
            name.to_owned(),
            MacroRule::User(UserMacro {
                params,
                rest,
                template: elements[3].clone(),
                position,
            }),
        );
        Ok(())
    }

    /// One rewrite step of a user macro call.
    fn apply_user(&mut self, rule: &UserMacro, form: Form) -> Result<Form, ExpandError> {
        let (position, elements) = Self::into_call_parts(form);
        let name = elements
            .first()
            .and_then(Form::symbol_name)
            .unwrap_or_default()
            .to_owned();
        let args = &elements[1..];

        let arity_ok = if rule.rest.is_some() {
            args.len() >= rule.params.len()
        } else {
            args.len() == rule.params.len()
        };
        if !arity_ok {
            let expected = if rule.rest.is_some() {
                format!("at least {} arguments", rule.params.len())
            } else {
                format!("{} arguments", rule.params.len())
            };
            return Err(ExpandError::arity(name, expected, args.len(), position));
        }

        let mut env = Env::default();
        for (param, arg) in rule.params.iter().zip(args) {
            env.insert(param.clone(), Binding::One(arg.clone()));
        }
        if let Some(rest) = &rule.rest {
            env.insert(rest.clone(), Binding::Seq(args[rule.params.len()..].to_vec()));
        }

        let mut renames = Renames::default();
        self.realize_template(&rule.template, &env, &mut renames, position)
    }

    /// Evaluates a macro body against the binding environment.
    ///
    /// Only the template constructors are evaluated: `quasiquote` realizes
    /// its payload, `quote` yields its payload verbatim, a bound symbol
    /// yields its binding, a literal yields itself. Anything else is a
    /// malformed template; macros do not run arbitrary code.
    fn realize_template(
        &mut self,
        template: &Form,
        env: &Env,
        renames: &mut Renames,
        call_position: CodeRange,
    ) -> Result<Form, ExpandError> {
        match &template.value {
            FormValue::Literal(_) => Ok(template.clone()),
            FormValue::Symbol(symbol) => match env.get(&symbol.name) {
                Some(binding) => Ok(Self::binding_to_form(binding, template.position)),
                None => Err(ExpandError::malformed(
                    format!("macro template references unbound symbol `{}`", symbol.name),
                    template.position,
                )),
            },
            FormValue::List(_) => match template.call_head() {
                Some("quasiquote") => {
                    let elements = template.call_elements().expect("matched as call");
                    if elements.len() != 2 {
                        return Err(ExpandError::arity(
                            "quasiquote",
                            "exactly one form",
                            elements.len() - 1,
                            template.position,
                        ));
                    }
                    self.quasiquote(&elements[1], env, Some(renames), 1)
                }
                Some("quote") => {
                    let elements = template.call_elements().expect("matched as call");
                    if elements.len() != 2 {
                        return Err(ExpandError::arity(
                            "quote",
                            "exactly one form",
                            elements.len() - 1,
                            template.position,
                        ));
                    }
                    Ok(elements[1].clone())
                }
                _ => Err(ExpandError::malformed(
                    "macro templates are built from quasiquote, quote, parameters and literals",
                    call_position,
                )),
            },
        }
    }

    fn binding_to_form(binding: &Binding, position: CodeRange) -> Form {
        match binding {
            Binding::One(form) => form.clone(),
            Binding::Seq(forms) => Form::list(ListKind::Array, forms.clone(), position),
        }
    }

    /// Realizes a quasiquoted template at the given quotation depth.
    ///
    /// `renames` carries the hygiene scope: template-local symbols starting
    /// with `$` that are not parameters are renamed once per expansion.
    /// `None` disables renaming (quasiquote outside a macro body).
    fn quasiquote(
        &mut self,
        form: &Form,
        env: &Env,
        mut renames: Option<&mut Renames>,
        depth: usize,
    ) -> Result<Form, ExpandError> {
        match &form.value {
            FormValue::Literal(_) => Ok(form.clone()),
            FormValue::Symbol(symbol) => {
                if symbol.name.starts_with('$') && !env.contains_key(&symbol.name) {
                    if let Some(renames) = renames {
                        let renamed = match renames.get(&symbol.name) {
                            Some(existing) => existing.clone(),
                            None => {
                                let fresh = self.gensym(&symbol.name);
                                renames.insert(symbol.name.clone(), fresh.clone());
                                fresh
                            }
                        };
                        return Ok(Form::symbol(renamed, form.position));
                    }
                }
                Ok(form.clone())
            }
            FormValue::List(list) => {
                if list.kind == ListKind::Parens {
                    match form.call_head() {
                        Some("unquote") => {
                            let elements = &list.elements;
                            if elements.len() != 2 {
                                return Err(ExpandError::arity(
                                    "unquote",
                                    "exactly one form",
                                    elements.len() - 1,
                                    form.position,
                                ));
                            }
                            if depth == 1 {
                                return Self::unquote_value(&elements[1], env);
                            }
                            let inner = self.quasiquote(&elements[1], env, renames, depth - 1)?;
                            return Ok(Form::call("unquote", vec![inner], form.position));
                        }
                        Some("quasiquote") => {
                            let elements = &list.elements;
                            if elements.len() != 2 {
                                return Err(ExpandError::arity(
                                    "quasiquote",
                                    "exactly one form",
                                    elements.len() - 1,
                                    form.position,
                                ));
                            }
                            let inner = self.quasiquote(&elements[1], env, renames, depth + 1)?;
                            return Ok(Form::call("quasiquote", vec![inner], form.position));
                        }
                        _ => {}
                    }
                }
                let mut elements = Vec::with_capacity(list.elements.len());
                for element in &list.elements {
                    if element.call_head() == Some("unquote-splicing") {
                        let inner = element.call_elements().expect("matched as call");
                        if inner.len() != 2 {
                            return Err(ExpandError::arity(
                                "unquote-splicing",
                                "exactly one form",
                                inner.len() - 1,
                                element.position,
                            ));
                        }
                        if depth == 1 {
                            elements.extend(Self::splice_value(&inner[1], env)?);
                        } else {
                            let nested = self.quasiquote(&inner[1], env, renames.as_deref_mut(), depth - 1)?;
                            elements.push(Form::call("unquote-splicing", vec![nested], element.position));
                        }
                    } else {
                        elements.push(self.quasiquote(element, env, renames.as_deref_mut(), depth)?);
                    }
                }
                Ok(Form::list(list.kind, elements, form.position))
            }
        }
    }

    /// The value an `~x` unquote splices: a bound parameter, a literal, or
    /// a quoted form.
    fn unquote_value(expr: &Form, env: &Env) -> Result<Form, ExpandError> {
        match &expr.value {
            FormValue::Symbol(symbol) => match env.get(&symbol.name) {
                Some(binding) => Ok(Self::binding_to_form(binding, expr.position)),
                None => Err(ExpandError::unknown_macro(symbol.name.clone(), expr.position)),
            },
            FormValue::Literal(_) => Ok(expr.clone()),
            FormValue::List(_) if expr.call_head() == Some("quote") => {
                let elements = expr.call_elements().expect("matched as call");
                if elements.len() == 2 {
                    Ok(elements[1].clone())
                } else {
                    Err(ExpandError::arity(
                        "quote",
                        "exactly one form",
                        elements.len() - 1,
                        expr.position,
                    ))
                }
            }
            FormValue::List(_) => Err(ExpandError::malformed(
                "unquote accepts bound parameters, literals and quoted forms",
                expr.position,
            )),
        }
    }

    /// The sequence an `~@xs` splice inserts into the surrounding list.
    fn splice_value(expr: &Form, env: &Env) -> Result<Vec<Form>, ExpandError> {
        let value = Self::unquote_value(expr, env)?;
        match value.value {
            FormValue::List(list) => Ok(list.elements),
            _ => Err(ExpandError::malformed(
                "unquote-splicing needs a sequence to splice",
                expr.position,
            )),
        }
    }

    /// A quasiquote outside any macro body behaves like `quote`; unquotes
    /// have no binding environment there and are rejected.
    fn expand_outer_quasiquote(&mut self, form: &Form) -> Result<Form, ExpandError> {
        let elements = form.call_elements().expect("caller matched the quasiquote head");
        if elements.len() != 2 {
            return Err(ExpandError::arity(
                "quasiquote",
                "exactly one form",
                elements.len() - 1,
                form.position,
            ));
        }
        let env = Env::default();
        let realized = self.quasiquote(&elements[1], &env, None, 1)?;
        Ok(Form::call("quote", vec![realized], form.position))
    }
}
