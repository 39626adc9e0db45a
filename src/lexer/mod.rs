//! Lexer for the Imp language
//!
//! Token recognition is generated by `logos`; this module adds line and
//! column tracking and turns unrecognized input into a [`CompileError`].

mod tokens;

pub use tokens::{Token, TokenKind};

use crate::common::Span;
use crate::diagnostics::CompileError;
use logos::Logos;

/// Lex source text into tokens, always terminated by [`TokenKind::Eof`]
pub fn lex(source: &str) -> Result<Vec<Token>, CompileError> {
    let lines = LineIndex::new(source);
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(source);

    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let (line, column) = lines.position(range.start);
        let span = Span::new(range.start, range.end, line);
        let text = lexer.slice();

        let kind = match result {
            Ok(kind) => kind,
            Err(()) => return Err(CompileError::lex(offending_text(text, source, range.start), span)),
        };

        if kind == TokenKind::IntLit && text.parse::<i32>().is_err() {
            return Err(CompileError::IntOutOfRange {
                text: text.to_string(),
                line,
                span: span.into(),
            });
        }

        tokens.push(Token {
            kind,
            span,
            column,
            text: text.to_string(),
        });
    }

    let (line, column) = lines.position(source.len());
    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::new(source.len(), source.len(), line),
        column,
        text: String::new(),
    });

    tracing::trace!("lexed {} tokens over {} lines", tokens.len(), line);
    Ok(tokens)
}

/// Logos reports an error slice that may be empty or span a whole
/// unterminated string; show the user something readable.
fn offending_text(slice: &str, source: &str, start: usize) -> String {
    if slice.starts_with('"') {
        return slice.lines().next().unwrap_or(slice).to_string();
    }
    match slice.chars().next() {
        Some(c) => c.to_string(),
        None => source[start..].chars().next().map(String::from).unwrap_or_default(),
    }
}

/// Byte offset to (line, column) mapping
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(
            source
                .char_indices()
                .filter(|&(_, c)| c == '\n')
                .map(|(i, _)| i + 1),
        );
        Self { starts }
    }

    fn position(&self, offset: usize) -> (usize, usize) {
        let line = match self.starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        (line + 1, offset - self.starts[line] + 1)
    }
}
