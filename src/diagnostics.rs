//! Diagnostic reporting with source locations
//!
//! Every stage of the pipeline fails with a single [`CompileError`]. Each
//! error carries the 1-based source line it was detected on and a byte span
//! so that the CLI can render a miette report. Callers that only need text
//! use [`CompileError::wire_format`], which produces `"<line>:<message>"`.

use crate::common::Span;
use miette::{Diagnostic, NamedSource, SourceSpan};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Source file for error reporting
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub content: Arc<str>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: Arc::from(content.into()),
        }
    }

    pub fn to_named_source(&self) -> NamedSource<String> {
        NamedSource::new(self.name.clone(), self.content.to_string())
    }
}

/// Convert our Span to miette's SourceSpan
impl From<Span> for SourceSpan {
    fn from(span: Span) -> Self {
        SourceSpan::new(span.start.into(), span.len())
    }
}

/// The fixed error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    LexError,
    SyntaxError,
    UndeclaredIdentifier,
    DuplicateDeclaration,
    ArraySizeError,
    TypeMismatch,
    ArityMismatch,
    MissingReturn,
    UnexpectedReturnValue,
    MissingEntryPoint,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::LexError => "LexError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::UndeclaredIdentifier => "UndeclaredIdentifier",
            ErrorKind::DuplicateDeclaration => "DuplicateDeclaration",
            ErrorKind::ArraySizeError => "ArraySizeError",
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::ArityMismatch => "ArityMismatch",
            ErrorKind::MissingReturn => "MissingReturn",
            ErrorKind::UnexpectedReturnValue => "UnexpectedReturnValue",
            ErrorKind::MissingEntryPoint => "MissingEntryPoint",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiler diagnostic
#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum CompileError {
    // === Lexical Errors ===
    #[error("unrecognized input `{text}`")]
    #[diagnostic(code(lex::unrecognized))]
    Lex {
        text: String,
        line: usize,
        #[label("not a valid token")]
        span: SourceSpan,
    },

    #[error("integer literal `{text}` does not fit in 32 bits")]
    #[diagnostic(code(lex::int_out_of_range))]
    IntOutOfRange {
        text: String,
        line: usize,
        #[label("literal too large")]
        span: SourceSpan,
    },

    // === Syntax Errors ===
    #[error("expected {expected}, found {found}")]
    #[diagnostic(code(parse::unexpected_token))]
    Syntax {
        expected: String,
        found: String,
        line: usize,
        #[label("unexpected token here")]
        span: SourceSpan,
    },

    #[error("nesting deeper than {limit} levels")]
    #[diagnostic(
        code(parse::too_deep),
        help("split the expression or block into smaller routines")
    )]
    NestingTooDeep {
        limit: usize,
        line: usize,
        #[label("nested too deeply here")]
        span: SourceSpan,
    },

    // === Resolution Errors ===
    #[error("undeclared identifier `{name}`")]
    #[diagnostic(code(resolve::undeclared))]
    UndeclaredIdentifier {
        name: String,
        line: usize,
        #[label("not found in this scope")]
        span: SourceSpan,
    },

    #[error("duplicate declaration of `{name}`")]
    #[diagnostic(code(resolve::duplicate))]
    DuplicateDeclaration {
        name: String,
        line: usize,
        #[label("already declared in this scope")]
        span: SourceSpan,
    },

    #[error("invalid size for array `{name}`: {reason}")]
    #[diagnostic(
        code(resolve::array_size),
        help("array sizes must be positive integer constants")
    )]
    ArraySize {
        name: String,
        reason: String,
        line: usize,
        #[label("invalid size")]
        span: SourceSpan,
    },

    // === Type Errors ===
    #[error("type mismatch: {detail}")]
    #[diagnostic(code(typecheck::mismatch))]
    TypeMismatch {
        detail: String,
        line: usize,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("`{name}` expects {expected} argument(s), found {found}")]
    #[diagnostic(code(typecheck::arity))]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        line: usize,
        #[label("wrong number of arguments")]
        span: SourceSpan,
    },

    #[error("missing return value in `{name}`")]
    #[diagnostic(
        code(typecheck::missing_return),
        help("end the routine with `return <expr>` or an `if`/`else` whose branches both return")
    )]
    MissingReturn {
        name: String,
        line: usize,
        #[label("routine can finish without returning a value")]
        span: SourceSpan,
    },

    #[error("procedure `{name}` cannot return a value")]
    #[diagnostic(code(typecheck::unexpected_return_value))]
    UnexpectedReturnValue {
        name: String,
        line: usize,
        #[label("value returned here")]
        span: SourceSpan,
    },

    #[error("missing entry point: {reason}")]
    #[diagnostic(
        code(typecheck::entry_point),
        help("declare `def main() {{ ... }}`")
    )]
    MissingEntryPoint {
        reason: String,
        line: usize,
        #[label("entry point")]
        span: SourceSpan,
    },
}

impl CompileError {
    pub fn lex(text: impl Into<String>, span: Span) -> Self {
        CompileError::Lex {
            text: text.into(),
            line: span.line,
            span: span.into(),
        }
    }

    pub fn syntax(expected: impl Into<String>, found: impl Into<String>, span: Span) -> Self {
        CompileError::Syntax {
            expected: expected.into(),
            found: found.into(),
            line: span.line,
            span: span.into(),
        }
    }

    pub fn too_deep(limit: usize, span: Span) -> Self {
        CompileError::NestingTooDeep {
            limit,
            line: span.line,
            span: span.into(),
        }
    }

    pub fn undeclared(name: impl Into<String>, span: Span) -> Self {
        CompileError::UndeclaredIdentifier {
            name: name.into(),
            line: span.line,
            span: span.into(),
        }
    }

    pub fn duplicate(name: impl Into<String>, span: Span) -> Self {
        CompileError::DuplicateDeclaration {
            name: name.into(),
            line: span.line,
            span: span.into(),
        }
    }

    pub fn array_size(name: impl Into<String>, reason: impl Into<String>, span: Span) -> Self {
        CompileError::ArraySize {
            name: name.into(),
            reason: reason.into(),
            line: span.line,
            span: span.into(),
        }
    }

    pub fn mismatch(detail: impl Into<String>, span: Span) -> Self {
        CompileError::TypeMismatch {
            detail: detail.into(),
            line: span.line,
            span: span.into(),
        }
    }

    pub fn arity(name: impl Into<String>, expected: usize, found: usize, span: Span) -> Self {
        CompileError::ArityMismatch {
            name: name.into(),
            expected,
            found,
            line: span.line,
            span: span.into(),
        }
    }

    pub fn missing_return(name: impl Into<String>, span: Span) -> Self {
        CompileError::MissingReturn {
            name: name.into(),
            line: span.line,
            span: span.into(),
        }
    }

    pub fn unexpected_return_value(name: impl Into<String>, span: Span) -> Self {
        CompileError::UnexpectedReturnValue {
            name: name.into(),
            line: span.line,
            span: span.into(),
        }
    }

    pub fn missing_entry_point(reason: impl Into<String>, span: Span) -> Self {
        CompileError::MissingEntryPoint {
            reason: reason.into(),
            line: span.line,
            span: span.into(),
        }
    }

    /// The taxonomy entry this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompileError::Lex { .. } | CompileError::IntOutOfRange { .. } => ErrorKind::LexError,
            CompileError::Syntax { .. } | CompileError::NestingTooDeep { .. } => {
                ErrorKind::SyntaxError
            }
            CompileError::UndeclaredIdentifier { .. } => ErrorKind::UndeclaredIdentifier,
            CompileError::DuplicateDeclaration { .. } => ErrorKind::DuplicateDeclaration,
            CompileError::ArraySize { .. } => ErrorKind::ArraySizeError,
            CompileError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            CompileError::ArityMismatch { .. } => ErrorKind::ArityMismatch,
            CompileError::MissingReturn { .. } => ErrorKind::MissingReturn,
            CompileError::UnexpectedReturnValue { .. } => ErrorKind::UnexpectedReturnValue,
            CompileError::MissingEntryPoint { .. } => ErrorKind::MissingEntryPoint,
        }
    }

    /// 1-based source line the error was detected on
    pub fn line(&self) -> usize {
        match self {
            CompileError::Lex { line, .. }
            | CompileError::IntOutOfRange { line, .. }
            | CompileError::Syntax { line, .. }
            | CompileError::NestingTooDeep { line, .. }
            | CompileError::UndeclaredIdentifier { line, .. }
            | CompileError::DuplicateDeclaration { line, .. }
            | CompileError::ArraySize { line, .. }
            | CompileError::TypeMismatch { line, .. }
            | CompileError::ArityMismatch { line, .. }
            | CompileError::MissingReturn { line, .. }
            | CompileError::UnexpectedReturnValue { line, .. }
            | CompileError::MissingEntryPoint { line, .. } => *line,
        }
    }

    /// Single-line message, safe to split from the line on the first colon
    pub fn message(&self) -> String {
        self.to_string().replace(['\n', '\r'], " ")
    }

    /// `"<line>:<message>"`, the form handed to the editor front end
    pub fn wire_format(&self) -> String {
        format!("{}:{}", self.line(), self.message())
    }
}
