use smallvec::SmallVec;

use crate::lex::StringSpan;

/// A lowered compilation unit: the ordered top-level statements.
///
/// The IR is immutable once lowering returns it; emission never rewrites,
/// only reads.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Program {
    pub body: Vec<Stmt>,
}

/// Declaration keyword for variable declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, strum::Display)]
pub enum DeclKind {
    #[strum(serialize = "const")]
    Const,
    #[strum(serialize = "let")]
    Let,
}

/// One `local as exported` pair of an export declaration.
///
/// `exported` is the exact string the surface form requested; `local` is the
/// canonicalized identifier.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExportPair {
    pub local: String,
    pub exported: String,
}

/// A statement-position IR node.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Stmt {
    VariableDeclaration {
        kind: DeclKind,
        name: String,
        init: Expr,
    },
    FunctionDeclaration(FunctionDecl),
    Return(Option<Expr>),
    /// A bare expression statement. Conditionals in this position emit as
    /// `if`/`else`, assignments without wrapping parentheses.
    Expr(Expr),
    Block(Vec<Stmt>),
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Vec<Stmt>,
    },
    /// A `defenum` mapping: member names double as their string values.
    EnumDeclaration {
        name: String,
        members: Vec<String>,
    },
    ImportDeclaration {
        specifier: String,
        binding: String,
    },
    ExportDeclaration {
        exports: Vec<ExportPair>,
    },
}

/// An expression-position IR node.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Expr {
    Num(f64),
    Str(String),
    Bool(bool),
    Null,
    Identifier {
        name: String,
        /// Set for `js/`-prefixed interop identifiers, whose spelling is
        /// preserved verbatim.
        is_js_access: bool,
    },
    /// A backtick template: `quasis` has exactly one more element than
    /// `expressions`, and the two interleave starting with a quasi.
    Template {
        quasis: Vec<String>,
        expressions: Vec<Expr>,
    },
    Array(Vec<Expr>),
    /// Property order is authored order; emission never reorders.
    Object(Vec<Property>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
        /// True when the call site used named arguments and `arguments` is
        /// the single collected object literal.
        is_named_args: bool,
    },
    New {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        /// A `Str` when `computed` is false (emitted as `.name`), otherwise
        /// an arbitrary key expression (emitted as `[expr]`).
        property: Box<Expr>,
        computed: bool,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assignment {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Function(Box<FunctionDecl>),
}

/// One `key: value` entry of an object literal.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Property {
    pub key: String,
    pub value: Expr,
}

/// A function, named (declaration) or anonymous (expression).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionDecl {
    /// `None` marks an anonymous function expression.
    pub name: Option<String>,
    pub params: SmallVec<[ParamInfo; 4]>,
    pub body: Vec<Stmt>,
    /// True when any surface parameter carried the `:` marker. The emitter
    /// then prints the single synthetic `params` parameter and destructures
    /// it in a body prologue; `params` retains the authored names and
    /// defaults for that prologue.
    pub is_named_args: bool,
}

/// A lowered parameter.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParamInfo {
    pub name: String,
    /// Parsed and preserved, never enforced.
    pub type_annotation: Option<String>,
    /// Present iff the surface form used `name = expr`.
    pub default_value: Option<Expr>,
    pub is_rest: bool,
}

impl ParamInfo {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_annotation: None,
            default_value: None,
            is_rest: false,
        }
    }
}

/// Binary operators, displayed as their JavaScript spelling.
///
/// HQL equality is strict: `=` renders `===`, `!=` renders `!==`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, strum::Display)]
pub enum BinaryOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Rem,
    #[strum(serialize = "===")]
    Eq,
    #[strum(serialize = "!==")]
    NotEq,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    LtE,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    GtE,
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
}

/// Unary operators, displayed as their JavaScript spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, strum::Display)]
pub enum UnaryOp {
    #[strum(serialize = "-")]
    Neg,
    #[strum(serialize = "!")]
    Not,
}

impl Expr {
    pub fn identifier(name: impl Into<String>) -> Self {
        Self::Identifier {
            name: name.into(),
            is_js_access: false,
        }
    }

    /// Builds a template literal from a cooked string and its interpolation
    /// spans (each span covers one `(ident)` group, parentheses included).
    /// The identifiers are expected to be canonicalized already.
    pub fn template(value: &str, spans: &[StringSpan], idents: Vec<Self>) -> Self {
        debug_assert_eq!(spans.len(), idents.len());
        let mut quasis = Vec::with_capacity(spans.len() + 1);
        let mut cursor = 0usize;
        for span in spans {
            quasis.push(value[cursor..span.start as usize].to_owned());
            cursor = span.end as usize;
        }
        quasis.push(value[cursor..].to_owned());
        Self::Template {
            quasis,
            expressions: idents,
        }
    }
}
