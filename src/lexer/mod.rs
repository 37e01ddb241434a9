use logos::Logos;

use crate::program::{Cell, Op, Program, Span};

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip r"[ \t\r\n\f]+")]
enum Token {
    // No escape sequences: the first closing quote ends the text
    #[regex(r#""[^"]*""#, |lex| {
        let s = lex.slice();
        s[1..s.len()-1].to_string()
    })]
    Text(String),

    // Everything else up to whitespace or a quote: integers, operators, words
    #[regex(r#"[^ \t\r\n\f"]+"#, |lex| word(lex.slice()))]
    Word(Cell),
}

fn looks_numeric(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('-') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

/// Resolve a bare token. `None` means it started like a number but isn't one.
fn word(s: &str) -> Option<Cell> {
    if looks_numeric(s) {
        return s.parse::<i64>().ok().map(Cell::Int);
    }
    Some(match Op::from_name(s) {
        Some(op) => Cell::Op(op),
        None => Cell::Word(s.to_string()),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    UnterminatedText,
    MalformedInteger,
}

impl std::fmt::Display for LexErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexErrorKind::UnterminatedText => f.write_str("unterminated text"),
            LexErrorKind::MalformedInteger => f.write_str("malformed integer"),
        }
    }
}

/// Tokenization failure. `position` is a byte offset into the source.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Syntax error at position {position}: {kind} '{snippet}'")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub position: usize,
    pub snippet: String,
    pub suggestion: String,
}

impl LexError {
    pub fn span(&self) -> Span {
        Span {
            start: self.position,
            end: self.position + self.snippet.len().max(1),
        }
    }
}

/// Lazy token stream over one line (or a whole script).
///
/// Yields each cell with its span. Stops for good after the first error.
pub struct Tokens<'src> {
    lexer: logos::Lexer<'src, Token>,
    source: &'src str,
    failed: bool,
}

pub fn tokenize(source: &str) -> Tokens<'_> {
    Tokens { lexer: Token::lexer(source), source, failed: false }
}

/// Tokenize all of `source` into a program, failing on the first bad token.
pub fn parse(source: &str) -> Result<Program, LexError> {
    let mut program = Program::new();
    for token in tokenize(source) {
        let (cell, span) = token?;
        program.push(cell, span);
    }
    Ok(program)
}

impl Iterator for Tokens<'_> {
    type Item = Result<(Cell, Span), LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let result = self.lexer.next()?;
        let range = self.lexer.span();
        let span = Span { start: range.start, end: range.end };
        match result {
            Ok(Token::Text(s)) => Some(Ok((Cell::Text(s), span))),
            Ok(Token::Word(cell)) => Some(Ok((cell, span))),
            Err(()) => {
                self.failed = true;
                Some(Err(self.error_at(range.start)))
            }
        }
    }
}

impl Tokens<'_> {
    fn error_at(&self, position: usize) -> LexError {
        let rest = &self.source[position..];
        if rest.starts_with('"') {
            let line_end = rest.find('\n').unwrap_or(rest.len());
            let snippet = rest[..line_end].trim_end_matches('\r').to_string();
            return LexError {
                kind: LexErrorKind::UnterminatedText,
                position,
                suggestion: format!("Close the text with a quote: '{}\"'", snippet),
                snippet,
            };
        }
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '"')
            .unwrap_or(rest.len());
        let snippet = rest[..end].to_string();
        LexError {
            kind: LexErrorKind::MalformedInteger,
            position,
            suggestion: suggest_integer_fix(&snippet),
            snippet,
        }
    }
}

fn suggest_integer_fix(bad: &str) -> String {
    let digits = bad.trim_start_matches('-');
    if digits.chars().all(|c| c.is_ascii_digit()) {
        return format!("Integers must fit in 64 bits ({} to {})", i64::MIN, i64::MAX);
    }
    let split = bad
        .char_indices()
        .skip(1)
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(bad.len());
    format!(
        "Separate the number from what follows: '{} {}'",
        &bad[..split],
        &bad[split..]
    )
}
