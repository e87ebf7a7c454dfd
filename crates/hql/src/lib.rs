#![doc = include_str!("../../../README.md")]

mod compile;
mod diagnostic;
mod emit;
mod expand;
mod forms;
mod helpers;
mod ir;
mod lex;
mod lower;
mod names;
mod parse;

pub use crate::{
    compile::{CancelFlag, CompileOptions, CompileOutput, ImportResolver, ResolvedImport, compile},
    diagnostic::{CompileError, Diagnostic, ErrorKind, Phase, ResolveError},
    emit::{EmitError, emit_program},
    expand::{DEFAULT_ITERATION_LIMIT, DEFAULT_RECURSION_LIMIT, ExpandError, Expander},
    forms::{Form, FormValue, ListForm, ListKind, Literal, Symbol},
    helpers::{HELPER_NAMES, HELPER_PRELUDE},
    ir::{
        BinaryOp, DeclKind, ExportPair, Expr, FunctionDecl, ParamInfo, Program, Property, Stmt, UnaryOp,
    },
    lex::{CodeLoc, CodeRange, StringSpan, Token, TokenValue, tokenize},
    lower::{LowerError, lower_program},
    names::{canonicalize, is_valid_js_identifier},
    parse::{ParseError, parse_program},
};
