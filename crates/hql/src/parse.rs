use std::fmt;

use crate::{
    forms::{Form, ListKind, Literal},
    lex::{CodeRange, Token, TokenValue, tokenize},
};

/// Errors produced while turning source text into surface forms.
///
/// The reader aborts on the first error; there is no recovery. Every
/// variant carries the offending position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A `(` with no matching `)`. Also reported for a quote sigil that
    /// reaches end of input before its form (the sigil desugars to a list).
    UnclosedParen { position: CodeRange },
    /// A `[` or `#[` with no matching `]`.
    UnclosedBracket { position: CodeRange },
    /// A `{` with no matching `}`.
    UnclosedBrace { position: CodeRange },
    UnclosedString { position: CodeRange },
    /// An escape the string syntax does not recognize, or a malformed
    /// `\(ident)` interpolation group.
    InvalidEscape { escape: char, position: CodeRange },
    /// A closing delimiter (or other stray character) with nothing open.
    UnexpectedClose { found: char, position: CodeRange },
}

impl ParseError {
    pub(crate) fn unclosed_paren(position: CodeRange) -> Self {
        Self::UnclosedParen { position }
    }

    pub(crate) fn unclosed_bracket(position: CodeRange) -> Self {
        Self::UnclosedBracket { position }
    }

    pub(crate) fn unclosed_brace(position: CodeRange) -> Self {
        Self::UnclosedBrace { position }
    }

    pub(crate) fn unclosed_string(position: CodeRange) -> Self {
        Self::UnclosedString { position }
    }

    pub(crate) fn invalid_escape(escape: char, position: CodeRange) -> Self {
        Self::InvalidEscape { escape, position }
    }

    pub(crate) fn unexpected_close(found: char, position: CodeRange) -> Self {
        Self::UnexpectedClose { found, position }
    }

    /// The position the error points at.
    pub fn position(&self) -> CodeRange {
        match self {
            Self::UnclosedParen { position }
            | Self::UnclosedBracket { position }
            | Self::UnclosedBrace { position }
            | Self::UnclosedString { position }
            | Self::InvalidEscape { position, .. }
            | Self::UnexpectedClose { position, .. } => *position,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnclosedParen { position } => {
                write!(f, "unclosed `(` opened at {}", position.start)
            }
            Self::UnclosedBracket { position } => {
                write!(f, "unclosed `[` opened at {}", position.start)
            }
            Self::UnclosedBrace { position } => {
                write!(f, "unclosed `{{` opened at {}", position.start)
            }
            Self::UnclosedString { position } => {
                write!(f, "unclosed string literal starting at {}", position.start)
            }
            Self::InvalidEscape { escape, position } => {
                write!(f, "invalid string escape `\\{escape}` at {}", position.start)
            }
            Self::UnexpectedClose { found, position } => {
                write!(f, "unexpected `{found}` at {}", position.start)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Parses a source string into the ordered sequence of top-level forms.
///
/// Tokens live only inside this call; the returned forms are the input to
/// macro expansion.
pub fn parse_program(source: &str) -> Result<Vec<Form>, ParseError> {
    let tokens = tokenize(source)?;
    let mut reader = Reader { tokens, index: 0 };
    let mut forms = Vec::new();
    while let Some(form) = reader.parse_form()? {
        forms.push(form);
    }
    Ok(forms)
}

struct Reader {
    tokens: Vec<Token>,
    index: usize,
}

impl Reader {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).cloned();
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    /// Commas are whitespace everywhere except inside `{…}`, where the map
    /// parser consumes them as pair separators itself.
    fn skip_commas(&mut self) {
        while matches!(self.peek().map(|t| &t.value), Some(TokenValue::Comma)) {
            self.index += 1;
        }
    }

    /// Parses the next form, or `None` at end of input.
    fn parse_form(&mut self) -> Result<Option<Form>, ParseError> {
        self.skip_commas();
        let Some(token) = self.bump() else {
            return Ok(None);
        };
        let position = token.position;
        let form = match token.value {
            TokenValue::LParen => self.parse_delimited(ListKind::Parens, position)?,
            TokenValue::LBracket => self.parse_delimited(ListKind::Array, position)?,
            TokenValue::HashBracket => self.parse_delimited(ListKind::Set, position)?,
            TokenValue::LBrace => self.parse_map(position)?,
            TokenValue::RParen => return Err(ParseError::unexpected_close(')', position)),
            TokenValue::RBracket => return Err(ParseError::unexpected_close(']', position)),
            TokenValue::RBrace => return Err(ParseError::unexpected_close('}', position)),
            TokenValue::Quote => self.parse_sigil("quote", position)?,
            TokenValue::Backtick => self.parse_sigil("quasiquote", position)?,
            TokenValue::Tilde => self.parse_sigil("unquote", position)?,
            TokenValue::TildeAt => self.parse_sigil("unquote-splicing", position)?,
            TokenValue::Str { value, interpolations } => {
                Form::literal(Literal::Str { value, interpolations }, position)
            }
            TokenValue::Num(n) => Form::literal(Literal::Num(n), position),
            TokenValue::Bool(b) => Form::literal(Literal::Bool(b), position),
            TokenValue::Nil => Form::literal(Literal::Nil, position),
            TokenValue::Symbol(name) => Form::symbol(name, position),
            TokenValue::Colon => Form::symbol(":", position),
            // skip_commas above makes this unreachable, but stay total
            TokenValue::Comma => return self.parse_form(),
        };
        Ok(Some(form))
    }

    /// Parses the body of a `(…)`, `[…]` or `#[…]` list, the opener already
    /// consumed.
    fn parse_delimited(&mut self, kind: ListKind, open: CodeRange) -> Result<Form, ParseError> {
        let mut elements = Vec::new();
        loop {
            self.skip_commas();
            match self.peek().map(|t| &t.value) {
                None => {
                    return Err(match kind {
                        ListKind::Parens => ParseError::unclosed_paren(open),
                        _ => ParseError::unclosed_bracket(open),
                    });
                }
                Some(TokenValue::RParen) if kind == ListKind::Parens => {
                    let close = self.bump().expect("peeked token exists").position;
                    return Ok(Form::list(kind, elements, open.to(close)));
                }
                Some(TokenValue::RBracket) if kind != ListKind::Parens => {
                    let close = self.bump().expect("peeked token exists").position;
                    return Ok(Form::list(kind, elements, open.to(close)));
                }
                _ => {
                    let Some(form) = self.parse_form()? else {
                        return Err(match kind {
                            ListKind::Parens => ParseError::unclosed_paren(open),
                            _ => ParseError::unclosed_bracket(open),
                        });
                    };
                    elements.push(form);
                }
            }
        }
    }

    /// Parses `{…}` into a flattened `[k0, v0, k1, v1, …]` map form.
    ///
    /// Keys and values may be separated by `:` (detached) or the key symbol
    /// may carry the colon attached (`name:`); pairs may be separated by
    /// commas. Key shapes are validated at lowering, not here.
    fn parse_map(&mut self, open: CodeRange) -> Result<Form, ParseError> {
        let mut elements: Vec<Form> = Vec::new();
        loop {
            while matches!(
                self.peek().map(|t| &t.value),
                Some(TokenValue::Comma | TokenValue::Colon)
            ) {
                self.index += 1;
            }
            match self.peek().map(|t| &t.value) {
                None => return Err(ParseError::unclosed_brace(open)),
                Some(TokenValue::RBrace) => {
                    let close = self.bump().expect("peeked token exists").position;
                    return Ok(Form::list(ListKind::Map, elements, open.to(close)));
                }
                _ => {
                    let Some(mut form) = self.parse_form()? else {
                        return Err(ParseError::unclosed_brace(open));
                    };
                    // in key position, strip the attached marker colon
                    if elements.len() % 2 == 0 {
                        if let Some(stripped) = form.as_symbol().and_then(|s| s.named_marker()) {
                            form = Form::symbol(stripped.to_owned(), form.position);
                        }
                    }
                    elements.push(form);
                }
            }
        }
    }

    /// Wraps the next form as `(quote x)` / `(quasiquote x)` / `(unquote x)`
    /// / `(unquote-splicing x)`.
    fn parse_sigil(&mut self, head: &str, sigil: CodeRange) -> Result<Form, ParseError> {
        let Some(form) = self.parse_form()? else {
            return Err(ParseError::unclosed_paren(sigil));
        };
        let position = sigil.to(form.position);
        Ok(Form::call(head, vec![form], position))
    }
}
