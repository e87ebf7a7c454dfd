use std::fmt;

use crate::parse::ParseError;

/// A single location in the source text.
///
/// Lines and columns are 1-based (what editors display), the offset is the
/// 0-based byte index into the source string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CodeLoc {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

impl CodeLoc {
    pub const fn new(line: u32, column: u32, offset: u32) -> Self {
        Self { line, column, offset }
    }
}

impl fmt::Display for CodeLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A half-open source span, start inclusive, end exclusive.
///
/// Every token and every surface form carries one so diagnostics stay
/// precise through all phases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CodeRange {
    pub start: CodeLoc,
    pub end: CodeLoc,
}

impl CodeRange {
    pub const fn new(start: CodeLoc, end: CodeLoc) -> Self {
        Self { start, end }
    }

    /// A range covering both operands, used when a sigil wraps a form.
    pub fn to(self, other: Self) -> Self {
        Self {
            start: self.start,
            end: other.end,
        }
    }
}

/// Byte range into a cooked string value marking one `\(ident)` group,
/// parentheses included.
///
/// The reader stores the characters `(ident)` literally; the spans let the
/// emitter re-recognize them and upgrade the string to a template literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StringSpan {
    pub start: u32,
    pub end: u32,
}

/// A lexical token with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub value: TokenValue,
    pub position: CodeRange,
}

/// The payload of a token.
///
/// `Str` carries the cooked value (escapes resolved) plus the interpolation
/// spans produced by `\(ident)` escapes. The keywords `true`, `false`,
/// `null` and `nil` are classified here, not left to the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    /// The set-literal opener `#[`.
    HashBracket,
    Quote,
    Backtick,
    Tilde,
    TildeAt,
    Str {
        value: String,
        interpolations: Vec<StringSpan>,
    },
    Num(f64),
    Bool(bool),
    Nil,
    Symbol(String),
    Colon,
    Comma,
}

impl TokenValue {
    /// Short human-readable description used in parse diagnostics.
    pub fn description(&self) -> String {
        match self {
            Self::LParen => "`(`".to_owned(),
            Self::RParen => "`)`".to_owned(),
            Self::LBracket => "`[`".to_owned(),
            Self::RBracket => "`]`".to_owned(),
            Self::LBrace => "`{`".to_owned(),
            Self::RBrace => "`}`".to_owned(),
            Self::HashBracket => "`#[`".to_owned(),
            Self::Quote => "`'`".to_owned(),
            Self::Backtick => "`` ` ``".to_owned(),
            Self::Tilde => "`~`".to_owned(),
            Self::TildeAt => "`~@`".to_owned(),
            Self::Str { .. } => "string literal".to_owned(),
            Self::Num(_) => "number literal".to_owned(),
            Self::Bool(_) => "boolean literal".to_owned(),
            Self::Nil => "`nil`".to_owned(),
            Self::Symbol(name) => format!("symbol `{name}`"),
            Self::Colon => "`:`".to_owned(),
            Self::Comma => "`,`".to_owned(),
        }
    }
}

/// Tokenizes an entire source string.
///
/// Fail-fast: the first lexical error aborts and is returned with its
/// position. Empty input yields an empty token sequence.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut cursor = Cursor::new(source);
    let mut tokens = Vec::new();
    while let Some(token) = cursor.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

/// True for characters that may appear in a symbol.
///
/// Symbols cover identifiers (`empty-set`, `a.b.c`, `js/console.log`),
/// operators (`+`, `->`, `<=`), keywords (`:else`) and named-parameter
/// markers (`x:`).
fn is_symbol_char(c: char) -> bool {
    c.is_alphanumeric()
        || matches!(
            c,
            '_' | '-' | '.' | '/' | '!' | '?' | '*' | '+' | '<' | '>' | '=' | '&' | '|' | '$' | '%' | ':' | '#'
        )
}

/// True when the maximal symbol lexeme should be read as a number literal.
///
/// Only a leading digit, or a leading `-` immediately followed by a digit,
/// qualifies; `-` alone and `a-b` stay symbols.
fn is_number_lexeme(lexeme: &str) -> bool {
    let mut chars = lexeme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('-') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

struct Cursor<'a> {
    source: &'a str,
    offset: usize,
    line: u32,
    column: u32,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    fn loc(&self) -> CodeLoc {
        CodeLoc::new(self.line, self.column, self.offset as u32)
    }

    fn rest(&self) -> &'a str {
        &self.source[self.offset..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.rest().chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Skips whitespace and `;` comments. Commas are tokens, not whitespace;
    /// the parser decides where they are separators and where they are noise.
    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == ';' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, ParseError> {
        self.skip_trivia();
        let start = self.loc();
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let value = match c {
            '(' => {
                self.bump();
                TokenValue::LParen
            }
            ')' => {
                self.bump();
                TokenValue::RParen
            }
            '[' => {
                self.bump();
                TokenValue::LBracket
            }
            ']' => {
                self.bump();
                TokenValue::RBracket
            }
            '{' => {
                self.bump();
                TokenValue::LBrace
            }
            '}' => {
                self.bump();
                TokenValue::RBrace
            }
            ',' => {
                self.bump();
                TokenValue::Comma
            }
            '\'' => {
                self.bump();
                TokenValue::Quote
            }
            '`' => {
                self.bump();
                TokenValue::Backtick
            }
            '~' => {
                self.bump();
                if self.peek() == Some('@') {
                    self.bump();
                    TokenValue::TildeAt
                } else {
                    TokenValue::Tilde
                }
            }
            '#' if self.peek_second() == Some('[') => {
                self.bump();
                self.bump();
                TokenValue::HashBracket
            }
            '"' => self.lex_string(start)?,
            c if is_symbol_char(c) => self.lex_symbolish(),
            other => {
                return Err(ParseError::unexpected_close(other, CodeRange::new(start, start)));
            }
        };

        let position = CodeRange::new(start, self.loc());
        Ok(Some(Token { value, position }))
    }

    /// Lexes the maximal run of symbol characters and classifies it as a
    /// number, a boolean, `nil`, a lone `:`, or a symbol.
    fn lex_symbolish(&mut self) -> TokenValue {
        let start = self.offset;
        while let Some(c) = self.peek() {
            if !is_symbol_char(c) {
                break;
            }
            self.bump();
        }
        let lexeme = &self.source[start..self.offset];
        match lexeme {
            "true" => TokenValue::Bool(true),
            "false" => TokenValue::Bool(false),
            "null" | "nil" => TokenValue::Nil,
            ":" => TokenValue::Colon,
            _ => {
                if is_number_lexeme(lexeme) {
                    if let Ok(n) = lexeme.parse::<f64>() {
                        return TokenValue::Num(n);
                    }
                }
                TokenValue::Symbol(lexeme.to_owned())
            }
        }
    }

    fn lex_string(&mut self, start: CodeLoc) -> Result<TokenValue, ParseError> {
        self.bump(); // opening quote
        let mut value = String::new();
        let mut interpolations = Vec::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(ParseError::unclosed_string(CodeRange::new(start, self.loc())));
            };
            match c {
                '"' => break,
                '\\' => {
                    let escape_loc = self.loc();
                    let Some(escaped) = self.bump() else {
                        return Err(ParseError::unclosed_string(CodeRange::new(start, self.loc())));
                    };
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '"' => value.push('"'),
                        '\\' => value.push('\\'),
                        '(' => self.lex_interpolation(start, &mut value, &mut interpolations)?,
                        other => {
                            return Err(ParseError::invalid_escape(
                                other,
                                CodeRange::new(escape_loc, self.loc()),
                            ));
                        }
                    }
                }
                other => value.push(other),
            }
        }
        Ok(TokenValue::Str { value, interpolations })
    }

    /// Consumes the identifier of a `\(ident)` escape.
    ///
    /// The characters `(ident)` are pushed literally onto the cooked value;
    /// the span over them (parentheses included) is recorded so emission can
    /// turn the string into a template literal.
    fn lex_interpolation(
        &mut self,
        string_start: CodeLoc,
        value: &mut String,
        interpolations: &mut Vec<StringSpan>,
    ) -> Result<(), ParseError> {
        let span_start = value.len() as u32;
        let group_loc = self.loc();
        value.push('(');
        loop {
            match self.peek() {
                None => {
                    return Err(ParseError::unclosed_string(CodeRange::new(string_start, self.loc())));
                }
                Some(')') => {
                    self.bump();
                    value.push(')');
                    break;
                }
                Some(c) if c == '"' || c == '\n' => {
                    return Err(ParseError::invalid_escape('(', CodeRange::new(group_loc, self.loc())));
                }
                Some(c) => {
                    self.bump();
                    value.push(c);
                }
            }
        }
        let span = StringSpan {
            start: span_start,
            end: value.len() as u32,
        };
        // `\()` carries no identifier to interpolate
        if span.end - span.start <= 2 {
            return Err(ParseError::invalid_escape('(', CodeRange::new(group_loc, self.loc())));
        }
        interpolations.push(span);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(source: &str) -> Vec<TokenValue> {
        tokenize(source)
            .expect("tokenize should succeed")
            .into_iter()
            .map(|t| t.value)
            .collect()
    }

    #[test]
    fn empty_input_yields_no_tokens() {
        assert_eq!(values(""), vec![]);
        assert_eq!(values("  ; just a comment\n"), vec![]);
    }

    #[test]
    fn delimiters_and_sigils() {
        assert_eq!(
            values("( ) [ ] { } #[ ' ` ~ ~@"),
            vec![
                TokenValue::LParen,
                TokenValue::RParen,
                TokenValue::LBracket,
                TokenValue::RBracket,
                TokenValue::LBrace,
                TokenValue::RBrace,
                TokenValue::HashBracket,
                TokenValue::Quote,
                TokenValue::Backtick,
                TokenValue::Tilde,
                TokenValue::TildeAt,
            ]
        );
    }

    #[test]
    fn negative_number_versus_minus_symbol() {
        assert_eq!(values("-42"), vec![TokenValue::Num(-42.0)]);
        assert_eq!(values("-"), vec![TokenValue::Symbol("-".to_owned())]);
        assert_eq!(values("-x"), vec![TokenValue::Symbol("-x".to_owned())]);
    }

    #[test]
    fn floats_and_exponents() {
        assert_eq!(values("3.25"), vec![TokenValue::Num(3.25)]);
        assert_eq!(values("1e3"), vec![TokenValue::Num(1000.0)]);
    }

    #[test]
    fn keyword_literals() {
        assert_eq!(
            values("true false null nil"),
            vec![
                TokenValue::Bool(true),
                TokenValue::Bool(false),
                TokenValue::Nil,
                TokenValue::Nil,
            ]
        );
    }

    #[test]
    fn symbols_keep_marker_colons() {
        assert_eq!(values("x:"), vec![TokenValue::Symbol("x:".to_owned())]);
        assert_eq!(values(":else"), vec![TokenValue::Symbol(":else".to_owned())]);
        assert_eq!(values(":"), vec![TokenValue::Colon]);
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            values(r#""a\nb\t\"\\""#),
            vec![TokenValue::Str {
                value: "a\nb\t\"\\".to_owned(),
                interpolations: vec![],
            }]
        );
    }

    #[test]
    fn interpolation_span_is_recorded() {
        let tokens = values(r#""Hello, \(name)!""#);
        let [TokenValue::Str { value, interpolations }] = tokens.as_slice() else {
            panic!("expected one string token, got {tokens:?}");
        };
        assert_eq!(value, "Hello, (name)!");
        assert_eq!(interpolations, &[StringSpan { start: 7, end: 13 }]);
        assert_eq!(&value[8..12], "name");
    }

    #[test]
    fn invalid_escape_is_rejected() {
        let err = tokenize(r#""\q""#).expect_err("expected invalid escape");
        assert!(matches!(err, ParseError::InvalidEscape { .. }), "got {err:?}");
    }

    #[test]
    fn unclosed_string_is_rejected() {
        let err = tokenize("\"abc").expect_err("expected unclosed string");
        assert!(matches!(err, ParseError::UnclosedString { .. }), "got {err:?}");
    }

    #[test]
    fn positions_track_lines_and_columns() {
        let tokens = tokenize("(def\n  x)").expect("tokenize should succeed");
        assert_eq!(tokens[0].position.start, CodeLoc::new(1, 1, 0));
        assert_eq!(tokens[2].position.start, CodeLoc::new(2, 3, 7));
    }
}
