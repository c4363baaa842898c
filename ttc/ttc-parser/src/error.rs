use serde::Serialize;

use crate::span::Span;

/// An error produced by the toolchain.
///
/// Errors are structured values, never plain strings: a [ErrorKind] naming
/// the boundary the failure belongs to, a [Detail] that callers can react to
/// without parsing display text, an optional source location, and hints
/// accumulated on the way out. The display string is derived from the
/// structure, not the other way around.
#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub span: Option<Span>,
    pub detail: Detail,
    pub hints: Vec<String>,
}

/// Multiple errors, as returned by the accumulating passes.
#[derive(Debug, Clone)]
pub struct Errors(pub Vec<Error>);

/// The distinguished error kinds exposed at the toolchain boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Lexical,
    Parse,
    Type(TypeErrorKind),
    UnmatchedLiteral,
    InvalidNNSyntax,
    UnsupportedFeature,
    Cancelled,
}

/// Sub-kinds of type errors. The typechecker accumulates these; everything
/// else fails fast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TypeErrorKind {
    UnresolvedSchema,
    UnknownParameter,
    TypeMismatch,
    NotMonitorable,
    NotList,
    AmbiguousJoin,
    InvalidOperator,
    UnresolvedVariable,
}

/// What actually went wrong.
#[derive(Debug, Clone)]
pub enum Detail {
    /// a free-form description
    Message(String),
    /// the input deviated from a grammar, surface or NN
    Syntax {
        expected: String,
        found: String,
        while_parsing: Option<String>,
    },
    /// a name did not resolve: a class, a function, a parameter, ...
    Missing { what: String, name: String },
}

impl Error {
    pub fn new(kind: ErrorKind, detail: Detail) -> Self {
        Error {
            kind,
            span: None,
            detail,
            hints: Vec::new(),
        }
    }

    pub fn new_simple<S: ToString>(kind: ErrorKind, message: S) -> Self {
        Error::new(kind, Detail::Message(message.to_string()))
    }

    pub fn type_error<S: ToString>(sub: TypeErrorKind, message: S) -> Self {
        Error::new_simple(ErrorKind::Type(sub), message)
    }

    pub fn cancelled() -> Self {
        Error::new_simple(ErrorKind::Cancelled, "operation was cancelled")
    }
}

impl std::fmt::Display for Detail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Detail::Message(text) => f.write_str(text),
            Detail::Syntax {
                expected,
                found,
                while_parsing,
            } => {
                write!(f, "found {found} where {expected} was expected")?;
                if let Some(what) = while_parsing {
                    write!(f, " while parsing {what}")?;
                }
                Ok(())
            }
            Detail::Missing { what, name } => write!(f, "unknown {what} `{name}`"),
        }
    }
}

impl From<Error> for Errors {
    fn from(error: Error) -> Self {
        Errors(vec![error])
    }
}

impl From<Error> for Vec<Error> {
    fn from(error: Error) -> Self {
        vec![error]
    }
}

impl std::error::Error for Error {}

impl std::error::Error for Errors {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.detail)?;
        for hint in &self.hints {
            write!(f, " ({hint})")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Errors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for e in &self.0 {
            writeln!(f, "{e}")?;
        }
        Ok(())
    }
}

/// Attaching context to an error as it bubbles up. Implemented for both
/// [Error] and `Result`, so call sites can tack a location on either.
pub trait ErrorContext: Sized {
    /// pin the error to a source location
    fn at(self, span: Option<Span>) -> Self;

    /// pin the error to a location only if it does not have one yet
    fn or_at(self, span: Option<Span>) -> Self;

    /// add a display hint
    fn hint<S: Into<String>>(self, text: S) -> Self;
}

impl ErrorContext for Error {
    fn at(mut self, span: Option<Span>) -> Self {
        self.span = span;
        self
    }

    fn or_at(mut self, span: Option<Span>) -> Self {
        self.span = self.span.or(span);
        self
    }

    fn hint<S: Into<String>>(mut self, text: S) -> Self {
        self.hints.push(text.into());
        self
    }
}

impl<T> ErrorContext for Result<T, Error> {
    fn at(self, span: Option<Span>) -> Self {
        self.map_err(|e| e.at(span))
    }

    fn or_at(self, span: Option<Span>) -> Self {
        self.map_err(|e| e.or_at(span))
    }

    fn hint<S: Into<String>>(self, text: S) -> Self {
        self.map_err(|e| e.hint(text))
    }
}
