//! Text to [`ExpressionNode`] in one call: tokenize, drop whitespace, bound
//! the nesting, run the grammar, and map token positions in errors back to
//! line and column.

use thiserror::Error;

use crate::analyzer::{parsers::parse_complete_expression, ParseError, Parser};
use crate::ast::ExpressionNode;
use crate::error::ErrorKind;
use crate::tokenizer::{
    symbol::Delimiter,
    token::{Token, TokenSpan, Tokenizer, TokenizerError},
};

/// Deepest allowed stack of open parentheses and pending unary operators.
pub const MAX_NESTING: usize = 64;
/// Most binary operators one expression may contain.
pub const MAX_OPERATORS: usize = 512;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParserError {
    #[error(transparent)]
    Tokenize(#[from] TokenizerError),
    #[error("Syntax error in `{expression}` at line {line}, column {column}: {cause}")]
    Syntax {
        expression: String,
        line: usize,
        column: usize,
        cause: ParseError,
    },
    #[error("Empty expression")]
    Empty,
    #[error("Expression nests deeper than {limit} levels")]
    TooDeep { limit: usize },
    #[error("Expression has more than {limit} binary operators")]
    TooManyOperators { limit: usize },
}

impl ParserError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::SyntaxError
    }
}

pub type ParserResult<T> = Result<T, ParserError>;

/// Parses a complete expression.
///
/// ```
/// let node = trigger_engine::parser::parse("1 + 2 * 3").unwrap();
/// assert_eq!(node.to_string(), "(1 + (2 * 3))");
/// ```
#[tracing::instrument(level = "debug")]
pub fn parse(text: &str) -> ParserResult<ExpressionNode> {
    let spans: Vec<TokenSpan> = Tokenizer::new()
        .tokenize(text)?
        .into_iter()
        .filter(|span| !matches!(span.token, Token::Whitespace(_)))
        .collect();

    if matches!(spans.as_slice(), [only] if only.token == Token::Eof) {
        return Err(ParserError::Empty);
    }

    let tokens: Vec<Token> = spans.iter().map(|span| span.token.clone()).collect();
    check_nesting(&tokens)?;
    match parse_complete_expression().parse(&tokens, 0) {
        Ok((_, node)) => Ok(node),
        Err(cause) => {
            let (line, column) = cause
                .position()
                .and_then(|index| spans.get(index))
                .map(|span| (span.line, span.column))
                .unwrap_or((1, 1));
            Err(ParserError::Syntax {
                expression: text.to_string(),
                line,
                column,
                cause,
            })
        }
    }
}

/// Rejects token streams whose tree would recurse too deeply.
///
/// The grammar and the evaluator recurse once per parenthesis, unary
/// operator and binary operator, so these are bounded before any tree exists.
fn check_nesting(tokens: &[Token]) -> ParserResult<()> {
    // Pending unary operators per open parenthesis; the outermost entry is the top level.
    let mut levels: Vec<usize> = vec![0];
    let mut nesting = 0usize;
    let mut binary = 0usize;
    let mut expect_operand = true;

    for token in tokens {
        match token {
            Token::Operator(_) if expect_operand => {
                if let Some(pending) = levels.last_mut() {
                    *pending += 1;
                }
                nesting += 1;
            }
            Token::Operator(_) => {
                binary += 1;
                expect_operand = true;
            }
            Token::Delimiter(Delimiter::OpenParen) => {
                levels.push(0);
                nesting += 1;
                expect_operand = true;
            }
            Token::Delimiter(Delimiter::CloseParen) => {
                if levels.len() > 1 {
                    let pending = levels.pop().unwrap_or(0);
                    nesting = nesting.saturating_sub(pending + 1);
                }
                nesting = nesting.saturating_sub(close_operand(&mut levels));
                expect_operand = false;
            }
            Token::Eof => break,
            _ => {
                nesting = nesting.saturating_sub(close_operand(&mut levels));
                expect_operand = false;
            }
        }
        if nesting > MAX_NESTING {
            return Err(ParserError::TooDeep { limit: MAX_NESTING });
        }
        if binary > MAX_OPERATORS {
            return Err(ParserError::TooManyOperators {
                limit: MAX_OPERATORS,
            });
        }
    }
    Ok(())
}

/// A finished operand consumes the unary operators waiting on it.
fn close_operand(levels: &mut [usize]) -> usize {
    levels.last_mut().map(std::mem::take).unwrap_or(0)
}
