use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::{
    diagnostic::{CompileError, Diagnostic, ResolveError},
    emit::emit_program,
    expand::{DEFAULT_ITERATION_LIMIT, DEFAULT_RECURSION_LIMIT, Expander},
    helpers::{HELPER_PRELUDE, references_helpers},
    ir::{DeclKind, ExportPair, Expr, Program, Property, Stmt},
    lower::lower_program,
    parse::parse_program,
};

/// Inline imports may nest (an inlined module importing another); this caps
/// resolver-driven recursion.
const MAX_INLINE_DEPTH: usize = 16;

/// Cooperative cancellation flag, checked by the driver between stages.
///
/// Clone the flag, hand one copy to the compiling thread's options and keep
/// the other to cancel from outside. There is no mid-stage cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// What the import resolver decided for a specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedImport {
    /// The payload is HQL source to compile and splice in place of the
    /// import.
    Inline(String),
    /// Emit an ES import targeting the payload.
    Passthrough(String),
}

/// The pluggable import resolver: the only boundary where I/O may happen.
/// An `Err` message becomes a resolve diagnostic.
pub type ImportResolver<'a> = dyn Fn(&str) -> Result<ResolvedImport, String> + 'a;

/// Options for one `compile` call.
pub struct CompileOptions<'a> {
    /// Used only in diagnostics.
    pub filename: String,
    /// When false the helper prelude is omitted and the host supplies the
    /// shims.
    pub emit_helpers: bool,
    /// Expansion recursion-depth cap.
    pub recursion_limit: usize,
    /// Expansion fixed-point iteration cap.
    pub iteration_limit: usize,
    pub cancel: CancelFlag,
    /// `None` treats every specifier as passthrough.
    pub resolve_import: Option<&'a ImportResolver<'a>>,
}

impl Default for CompileOptions<'_> {
    fn default() -> Self {
        Self {
            filename: "<input>".to_owned(),
            emit_helpers: true,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            iteration_limit: DEFAULT_ITERATION_LIMIT,
            cancel: CancelFlag::new(),
            resolve_import: None,
        }
    }
}

/// The result of a `compile` call: code on success, otherwise no code and
/// exactly one diagnostic (fail-fast, no warnings).
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOutput {
    pub code: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Compiles one HQL source unit to JavaScript.
///
/// The pipeline is strictly linear and synchronous: read → expand → lower →
/// resolve imports → emit. All state (macro table, helper flag) is scoped to
/// this call; concurrent calls on independent inputs are safe.
pub fn compile(source: &str, options: &CompileOptions<'_>) -> CompileOutput {
    match compile_inner(source, options) {
        Ok(code) => CompileOutput {
            code: Some(code),
            diagnostics: Vec::new(),
        },
        Err(error) => CompileOutput {
            code: None,
            diagnostics: vec![error.into_diagnostic(&options.filename)],
        },
    }
}

fn compile_inner(source: &str, options: &CompileOptions<'_>) -> Result<String, CompileError> {
    let program = lower_unit(source, options, 0)?;
    check_cancel(options)?;
    let mut code = String::new();
    if options.emit_helpers && references_helpers(&program) {
        code.push_str(HELPER_PRELUDE);
    }
    code.push_str(&emit_program(&program)?);
    Ok(code)
}

/// Runs read → expand → lower for one unit (the entry source or an inlined
/// import), then resolves the unit's imports.
fn lower_unit(source: &str, options: &CompileOptions<'_>, depth: usize) -> Result<Program, CompileError> {
    check_cancel(options)?;
    let forms = parse_program(source)?;
    check_cancel(options)?;
    let mut expander = Expander::new(options.recursion_limit, options.iteration_limit);
    let forms = expander.expand_program(forms)?;
    check_cancel(options)?;
    let program = lower_program(&forms)?;
    resolve_imports(program, options, depth)
}

/// Rewrites import declarations per the resolver's verdicts.
///
/// Passthrough imports keep their declaration with the resolved target.
/// Inline imports splice the compiled module body in place of the import
/// and bind the import name to an object built from the module's exports.
fn resolve_imports(program: Program, options: &CompileOptions<'_>, depth: usize) -> Result<Program, CompileError> {
    let Some(resolver) = options.resolve_import else {
        return Ok(program);
    };
    let mut body = Vec::with_capacity(program.body.len());
    for stmt in program.body {
        let Stmt::ImportDeclaration { specifier, binding } = stmt else {
            body.push(stmt);
            continue;
        };
        check_cancel(options)?;
        let resolved = resolver(&specifier).map_err(|message| ResolveError {
            specifier: specifier.clone(),
            message,
            position: None,
        })?;
        match resolved {
            ResolvedImport::Passthrough(target) => {
                body.push(Stmt::ImportDeclaration {
                    specifier: target,
                    binding,
                });
            }
            ResolvedImport::Inline(inline_source) => {
                if depth >= MAX_INLINE_DEPTH {
                    return Err(ResolveError {
                        specifier,
                        message: "inline imports nest too deeply".to_owned(),
                        position: None,
                    }
                    .into());
                }
                let inlined = lower_unit(&inline_source, options, depth + 1)?;
                let mut exports: Vec<ExportPair> = Vec::new();
                for inner in inlined.body {
                    if let Stmt::ExportDeclaration { exports: pairs } = inner {
                        exports.extend(pairs);
                    } else {
                        body.push(inner);
                    }
                }
                let properties = exports
                    .into_iter()
                    .map(|pair| Property {
                        key: pair.exported,
                        value: Expr::identifier(pair.local),
                    })
                    .collect();
                body.push(Stmt::VariableDeclaration {
                    kind: DeclKind::Const,
                    name: binding,
                    init: Expr::Object(properties),
                });
            }
        }
    }
    Ok(Program { body })
}

fn check_cancel(options: &CompileOptions<'_>) -> Result<(), CompileError> {
    if options.cancel.is_cancelled() {
        return Err(CompileError::Cancelled);
    }
    Ok(())
}
