use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    combinator::recognize,
    error::{context, VerboseError},
    sequence::pair,
    IResult,
};
use thiserror::Error;

use super::{
    literal::{parse_literal, Literal},
    symbol::{parse_delimiter, parse_operator, Delimiter, Operator},
    whitespace::parse_whitespace,
};
use crate::error::ErrorKind;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Identifier(String),
    // Symbols
    Operator(Operator),
    Delimiter(Delimiter),
    // Literals
    Literal(Literal),
    // Formatting
    Whitespace(String),
    /// End of input, always the last token.
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Identifier(name) => write!(f, "{}", name),
            Token::Operator(op) => write!(f, "{}", op),
            Token::Delimiter(d) => write!(f, "{}", d),
            Token::Literal(l) => write!(f, "{}", l),
            Token::Whitespace(_) => write!(f, "whitespace"),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    current_position: usize,
    current_line: usize,
    current_column: usize,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self {
            current_position: 0,
            current_line: 1,   // 1-based
            current_column: 1, // 1-based
        }
    }

    #[tracing::instrument(level = "debug", skip(input))]
    pub fn tokenize(&mut self, input: &str) -> TokenizerResult<Vec<TokenSpan>> {
        let mut tokens = Vec::new();
        let mut remaining = input;

        while !remaining.is_empty() {
            let start_position = self.current_position;
            let start_line = self.current_line;
            let start_column = self.current_column;

            let result = alt((
                parse_whitespace,
                parse_literal,
                parse_operator,
                parse_delimiter,
                parse_identifier,
            ))(remaining);

            match result {
                Ok((new_remaining, token)) => {
                    let consumed = &remaining[..(remaining.len() - new_remaining.len())];
                    self.update_position(consumed);

                    tokens.push(TokenSpan {
                        token,
                        start: start_position,
                        end: self.current_position,
                        line: start_line,
                        column: start_column,
                    });

                    remaining = new_remaining;
                }
                Err(e) => {
                    let found = remaining.chars().take(20).collect::<String>();
                    let span = Span {
                        start: self.current_position,
                        end: self.current_position + 1,
                        line: self.current_line,
                        column: self.current_column,
                    };
                    let error = match e {
                        nom::Err::Incomplete(e) => TokenizerError::ParseError {
                            message: format!("Incomplete input, {:?}", e),
                            found,
                            span,
                        },
                        nom::Err::Error(e) | nom::Err::Failure(e) => TokenizerError::ParseError {
                            message: nom::error::convert_error(remaining, e),
                            found,
                            span,
                        },
                    };
                    tracing::debug!("{}", error);
                    return Err(error);
                }
            }
        }

        tokens.push(TokenSpan {
            token: Token::Eof,
            start: self.current_position,
            end: self.current_position,
            line: self.current_line,
            column: self.current_column,
        });

        Ok(tokens)
    }

    fn update_position(&mut self, text: &str) {
        for c in text.chars() {
            self.current_position += c.len_utf8();
            if c == '\n' {
                self.current_line += 1;
                self.current_column = 1;
            } else {
                self.current_column += 1;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenSpan {
    pub token: Token,
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line: {}, column: {}, start: {}, end: {}",
            self.line, self.column, self.start, self.end
        )
    }
}

/// Identifiers, plus the word literals `true`, `false` and `null`.
#[tracing::instrument(level = "debug", skip(input))]
fn parse_identifier(input: &str) -> ParserResult<Token> {
    let (input, id) = context(
        "identifier",
        recognize(pair(
            take_while1(|c: char| c.is_alphabetic() || c == '_'),
            take_while(|c: char| c.is_alphanumeric() || c == '_'),
        )),
    )(input)?;

    if id.eq_ignore_ascii_case("true") {
        return Ok((input, Token::Literal(Literal::Boolean(true))));
    }
    if id.eq_ignore_ascii_case("false") {
        return Ok((input, Token::Literal(Literal::Boolean(false))));
    }
    if id == "null" {
        return Ok((input, Token::Literal(Literal::Null)));
    }

    Ok((input, Token::Identifier(id.to_string())))
}

pub type ParserResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

pub type TokenizerResult<T> = Result<T, TokenizerError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TokenizerError {
    #[error("Parse error: {message} at position {span}")]
    ParseError {
        message: String,
        found: String,
        span: Span,
    },
}

impl TokenizerError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::SyntaxError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn significant(input: &str) -> Vec<Token> {
        Tokenizer::new()
            .tokenize(input)
            .unwrap()
            .into_iter()
            .map(|span| span.token)
            .filter(|t| !matches!(t, Token::Whitespace(_)))
            .collect()
    }

    #[test]
    fn test_identifier() {
        let (rest, token) = parse_identifier("my_var123 other").unwrap();
        assert_eq!(token, Token::Identifier("my_var123".to_string()));
        assert_eq!(rest, " other");
    }

    #[test]
    fn test_word_literals() {
        let test_cases = vec![
            ("true", Token::Literal(Literal::Boolean(true))),
            ("TRUE", Token::Literal(Literal::Boolean(true))),
            ("False", Token::Literal(Literal::Boolean(false))),
            ("null", Token::Literal(Literal::Null)),
            ("NULL", Token::Identifier("NULL".to_string())),
            ("trueish", Token::Identifier("trueish".to_string())),
        ];
        for (input, expected) in test_cases {
            let (_, token) = parse_identifier(input).unwrap();
            assert_eq!(token, expected, "input: {}", input);
        }
    }

    #[test]
    fn test_identifier_cannot_start_with_digit() {
        assert!(parse_identifier("1abc").is_err());
    }

    #[test]
    fn test_expression_tokens() {
        let tokens = significant(r#"time > 1000 && state === "falling""#);
        assert_eq!(
            tokens,
            vec![
                Token::Identifier("time".to_string()),
                Token::Operator(Operator::Greater),
                Token::Literal(Literal::Integer(1000)),
                Token::Operator(Operator::And),
                Token::Identifier("state".to_string()),
                Token::Operator(Operator::StrictEqual),
                Token::Literal(Literal::String("falling".to_string())),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenizer_with_position() {
        let tokens = Tokenizer::new().tokenize("x\n+ y").unwrap();
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[0].column, 1);
        assert_eq!(tokens[2].token, Token::Operator(Operator::Plus));
        assert_eq!(tokens[2].line, 2);
        assert_eq!(tokens[2].column, 1);
        let eof = tokens.last().unwrap();
        assert_eq!(eof.token, Token::Eof);
        assert_eq!(eof.start, 5);
    }

    #[test]
    fn test_empty_input_is_only_eof() {
        assert_eq!(significant(""), vec![Token::Eof]);
        assert_eq!(significant("   "), vec![Token::Eof]);
    }

    #[test]
    fn test_unknown_character_reports_span() {
        let err = Tokenizer::new().tokenize("a # b").unwrap_err();
        match &err {
            TokenizerError::ParseError { found, span, .. } => {
                assert_eq!(found, "# b");
                assert_eq!(span.column, 3);
            }
        }
        assert_eq!(err.kind(), ErrorKind::SyntaxError);
    }
}
