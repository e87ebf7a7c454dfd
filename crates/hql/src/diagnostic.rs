use std::fmt;

use crate::{
    emit::EmitError,
    expand::ExpandError,
    lex::{CodeLoc, CodeRange},
    lower::LowerError,
    parse::ParseError,
};

/// The pipeline stage a diagnostic originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[strum(serialize = "read")]
    Read,
    #[strum(serialize = "expand")]
    Expand,
    #[strum(serialize = "lower")]
    Lower,
    #[strum(serialize = "emit")]
    Emit,
    #[strum(serialize = "resolve")]
    Resolve,
}

/// The closed set of diagnostic kinds, one per failure the pipeline can
/// report. `Cancelled` is the driver's cooperative-cancellation marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    UnclosedParen,
    UnclosedBracket,
    UnclosedBrace,
    UnclosedString,
    InvalidEscape,
    UnexpectedClose,
    UnknownMacro,
    MacroArityMismatch,
    MalformedTemplate,
    RecursionLimitExceeded,
    DuplicateParameter,
    UnknownSpecialForm,
    BadArgumentCount,
    UnsupportedKeySyntax,
    Emit,
    Resolve,
    Cancelled,
}

/// A failure reported by the import resolver, attributed to the import
/// statement that triggered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveError {
    pub specifier: String,
    pub message: String,
    pub position: Option<CodeRange>,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to resolve import \"{}\": {}", self.specifier, self.message)
    }
}

impl std::error::Error for ResolveError {}

/// Any failure of the compilation pipeline, separated by stage.
///
/// Keeping the per-phase errors distinct lets callers route recovery
/// without string matching; `Diagnostic` is the flattened user-facing view.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    Parse(ParseError),
    Expand(ExpandError),
    Lower(LowerError),
    Emit(EmitError),
    Resolve(ResolveError),
    /// The caller's cancel flag was observed between stages.
    Cancelled,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(error) => write!(f, "parse error: {error}"),
            Self::Expand(error) => write!(f, "expansion error: {error}"),
            Self::Lower(error) => write!(f, "lowering error: {error}"),
            Self::Emit(error) => write!(f, "{error}"),
            Self::Resolve(error) => write!(f, "{error}"),
            Self::Cancelled => write!(f, "compilation cancelled"),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<ParseError> for CompileError {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

impl From<ExpandError> for CompileError {
    fn from(error: ExpandError) -> Self {
        Self::Expand(error)
    }
}

impl From<LowerError> for CompileError {
    fn from(error: LowerError) -> Self {
        Self::Lower(error)
    }
}

impl From<EmitError> for CompileError {
    fn from(error: EmitError) -> Self {
        Self::Emit(error)
    }
}

impl From<ResolveError> for CompileError {
    fn from(error: ResolveError) -> Self {
        Self::Resolve(error)
    }
}

impl CompileError {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Parse(_) => Phase::Read,
            Self::Expand(_) => Phase::Expand,
            Self::Lower(_) => Phase::Lower,
            Self::Emit(_) => Phase::Emit,
            Self::Resolve(_) | Self::Cancelled => Phase::Resolve,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(error) => match error {
                ParseError::UnclosedParen { .. } => ErrorKind::UnclosedParen,
                ParseError::UnclosedBracket { .. } => ErrorKind::UnclosedBracket,
                ParseError::UnclosedBrace { .. } => ErrorKind::UnclosedBrace,
                ParseError::UnclosedString { .. } => ErrorKind::UnclosedString,
                ParseError::InvalidEscape { .. } => ErrorKind::InvalidEscape,
                ParseError::UnexpectedClose { .. } => ErrorKind::UnexpectedClose,
            },
            Self::Expand(error) => match error {
                ExpandError::UnknownMacro { .. } => ErrorKind::UnknownMacro,
                ExpandError::MacroArityMismatch { .. } => ErrorKind::MacroArityMismatch,
                ExpandError::MalformedTemplate { .. } => ErrorKind::MalformedTemplate,
                ExpandError::RecursionLimitExceeded { .. } => ErrorKind::RecursionLimitExceeded,
                ExpandError::DuplicateParameter { .. } => ErrorKind::DuplicateParameter,
            },
            Self::Lower(error) => match error {
                LowerError::UnknownSpecialForm { .. } => ErrorKind::UnknownSpecialForm,
                LowerError::BadArgumentCount { .. } => ErrorKind::BadArgumentCount,
                LowerError::UnsupportedKeySyntax { .. } => ErrorKind::UnsupportedKeySyntax,
            },
            Self::Emit(_) => ErrorKind::Emit,
            Self::Resolve(_) => ErrorKind::Resolve,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn position(&self) -> Option<CodeRange> {
        match self {
            Self::Parse(error) => Some(error.position()),
            Self::Expand(error) => Some(error.position()),
            Self::Lower(error) => Some(error.position()),
            Self::Emit(_) | Self::Cancelled => None,
            Self::Resolve(error) => error.position,
        }
    }

    /// Flattens this error into the user-facing diagnostic shape.
    pub fn into_diagnostic(self, filename: &str) -> Diagnostic {
        Diagnostic {
            kind: self.kind(),
            phase: self.phase(),
            position: self.position().map(|range| range.start),
            message: self.to_string(),
            filename: filename.to_owned(),
        }
    }
}

/// What `compile` reports to callers: kind, message, position and phase.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
    pub position: Option<CodeLoc>,
    pub phase: Phase,
    /// The `filename` passed in the compile options; diagnostics are its
    /// only consumer.
    pub filename: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(position) => {
                write!(f, "{}:{}: [{}] {}", self.filename, position, self.phase, self.message)
            }
            None => write!(f, "{}: [{}] {}", self.filename, self.phase, self.message),
        }
    }
}
