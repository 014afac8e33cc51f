//! # Core Parser Definitions
//!
//! The parser interface and error type shared by every combinator.

use thiserror::Error;

/// Parses a slice of input items starting at `pos`.
///
/// On success the parser returns the position after the consumed items
/// together with its output.
pub trait Parser<I, O> {
    fn parse(&self, input: &[I], pos: usize) -> ParseResult<O>;
}

pub type ParseResult<O> = Result<(usize, O), ParseError>;

/// Positions are token indices; the caller maps them back to source spans.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Unexpected end of input at token {position}")]
    UnexpectedEOF { position: usize },
    #[error("Unexpected {found} at token {position}, expected {expected}")]
    Unexpected {
        expected: String,
        found: String,
        position: usize,
    },
    #[error("No alternative matched at token {position}")]
    NoAlternative { position: usize },
    #[error("Fail: {0}")]
    Fail(String),
    #[error("{message}: {inner}")]
    WithContext {
        message: String,
        inner: Box<ParseError>,
    },
}

impl ParseError {
    /// Token index the innermost error points at, if any.
    pub fn position(&self) -> Option<usize> {
        match self.root_cause() {
            ParseError::UnexpectedEOF { position }
            | ParseError::Unexpected { position, .. }
            | ParseError::NoAlternative { position } => Some(*position),
            _ => None,
        }
    }

    /// The error with all context layers peeled off.
    pub fn root_cause(&self) -> &ParseError {
        match self {
            ParseError::WithContext { inner, .. } => inner.root_cause(),
            other => other,
        }
    }
}
