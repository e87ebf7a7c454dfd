use crate::lex::{CodeRange, StringSpan};

/// A surface-syntax form with its source position.
///
/// This is the tree the reader produces and the macro expander rewrites.
/// All passes build fresh trees; children are owned, never shared.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Form {
    pub position: CodeRange,
    pub value: FormValue,
}

/// The payload of a surface form.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum FormValue {
    Literal(Literal),
    Symbol(Symbol),
    List(ListForm),
}

/// A self-evaluating literal.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Literal {
    Num(f64),
    /// A string with the interpolation spans recorded by the reader for
    /// `\(ident)` escapes (empty for plain strings).
    Str {
        value: String,
        interpolations: Vec<StringSpan>,
    },
    Bool(bool),
    Nil,
}

/// A symbol, stored as the raw source text.
///
/// Symbols may contain dots (`a.b.c`), carry a leading `js/` interop prefix,
/// a leading `:` (keyword, used by `cond`'s `:else`), or a trailing `:`
/// (named-parameter marker). Canonicalization happens at lowering, not here,
/// so user macros still see the original spelling.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Symbol {
    pub name: String,
}

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// True for `js/`-prefixed JavaScript interop identifiers.
    pub fn is_js_access(&self) -> bool {
        self.name.starts_with("js/")
    }

    /// The name without its trailing `:`, if the symbol carries the
    /// named-parameter marker.
    pub fn named_marker(&self) -> Option<&str> {
        if self.name.len() > 1 && self.name.ends_with(':') {
            Some(&self.name[..self.name.len() - 1])
        } else {
            None
        }
    }

    /// True for keyword symbols such as `:else`.
    pub fn is_keyword(&self) -> bool {
        self.name.len() > 1 && self.name.starts_with(':')
    }
}

/// Which bracket family produced a list.
///
/// `Array` for `[…]`, `Map` for `{…}`, `Set` for `#[…]`, `Parens` for plain
/// S-expressions. At most one literal flavor applies to a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ListKind {
    Parens,
    Array,
    Map,
    Set,
}

/// A list form. Map elements are stored flattened: `[k0, v0, k1, v1, …]`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ListForm {
    pub kind: ListKind,
    pub elements: Vec<Form>,
}

impl Form {
    pub fn new(position: CodeRange, value: FormValue) -> Self {
        Self { position, value }
    }

    pub fn symbol(name: impl Into<String>, position: CodeRange) -> Self {
        Self::new(position, FormValue::Symbol(Symbol::new(name)))
    }

    pub fn literal(literal: Literal, position: CodeRange) -> Self {
        Self::new(position, FormValue::Literal(literal))
    }

    pub fn nil(position: CodeRange) -> Self {
        Self::literal(Literal::Nil, position)
    }

    pub fn num(value: f64, position: CodeRange) -> Self {
        Self::literal(Literal::Num(value), position)
    }

    pub fn list(kind: ListKind, elements: Vec<Self>, position: CodeRange) -> Self {
        Self::new(position, FormValue::List(ListForm { kind, elements }))
    }

    /// A `(head args…)` call form, used heavily by macro rewrites.
    pub fn call(head: &str, mut args: Vec<Self>, position: CodeRange) -> Self {
        let mut elements = vec![Self::symbol(head, position)];
        elements.append(&mut args);
        Self::list(ListKind::Parens, elements, position)
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match &self.value {
            FormValue::Symbol(symbol) => Some(symbol),
            _ => None,
        }
    }

    pub fn symbol_name(&self) -> Option<&str> {
        self.as_symbol().map(|s| s.name.as_str())
    }

    pub fn as_list(&self) -> Option<&ListForm> {
        match &self.value {
            FormValue::List(list) => Some(list),
            _ => None,
        }
    }

    /// The elements of a `(…)` list, if this form is one.
    pub fn call_elements(&self) -> Option<&[Form]> {
        match &self.value {
            FormValue::List(list) if list.kind == ListKind::Parens => Some(&list.elements),
            _ => None,
        }
    }

    /// The head symbol of a `(head …)` form, if any.
    pub fn call_head(&self) -> Option<&str> {
        self.call_elements()?.first()?.symbol_name()
    }

    /// True when this form is the symbol `name`.
    pub fn is_symbol(&self, name: &str) -> bool {
        self.symbol_name() == Some(name)
    }

    /// True when this form is the literal `true`.
    pub fn is_true_literal(&self) -> bool {
        matches!(self.value, FormValue::Literal(Literal::Bool(true)))
    }

    /// Short description used in expansion and lowering diagnostics.
    pub fn description(&self) -> String {
        match &self.value {
            FormValue::Literal(Literal::Num(_)) => "number literal".to_owned(),
            FormValue::Literal(Literal::Str { .. }) => "string literal".to_owned(),
            FormValue::Literal(Literal::Bool(_)) => "boolean literal".to_owned(),
            FormValue::Literal(Literal::Nil) => "`nil`".to_owned(),
            FormValue::Symbol(symbol) => format!("symbol `{}`", symbol.name),
            FormValue::List(list) => match list.kind {
                ListKind::Parens => "list".to_owned(),
                ListKind::Array => "array literal".to_owned(),
                ListKind::Map => "map literal".to_owned(),
                ListKind::Set => "set literal".to_owned(),
            },
        }
    }
}
