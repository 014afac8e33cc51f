use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::is_not,
    character::complete::{char, digit1},
    combinator::{map, map_res, opt, recognize, value},
    error::context,
    multi::fold_many0,
    sequence::{delimited, pair, preceded},
};

use super::token::{ParserResult, Token};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "\"{}\"", s),
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Float(x) => write!(f, "{}", x),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Null => write!(f, "null"),
        }
    }
}

#[tracing::instrument(level = "debug", skip(input))]
fn parse_escape(input: &str) -> ParserResult<char> {
    context(
        "escape sequence",
        preceded(
            char('\\'),
            alt((
                value('\n', char('n')),
                value('\t', char('t')),
                value('"', char('"')),
                value('\'', char('\'')),
                value('\\', char('\\')),
            )),
        ),
    )(input)
}

fn quoted<'a>(
    quote: char,
    stop: &'static str,
) -> impl FnMut(&'a str) -> ParserResult<'a, String> {
    delimited(
        char(quote),
        fold_many0(
            alt((
                map(is_not(stop), |s: &str| s.to_string()),
                map(parse_escape, String::from),
            )),
            String::new,
            |mut acc, part| {
                acc.push_str(&part);
                acc
            },
        ),
        char(quote),
    )
}

#[tracing::instrument(level = "debug", skip(input))]
fn parse_string_literal(input: &str) -> ParserResult<Literal> {
    context(
        "string literal",
        map(
            alt((quoted('"', "\"\\"), quoted('\'', "'\\"))),
            Literal::String,
        ),
    )(input)
}

/// Integer unless a decimal point is present; integers too large for `i64`
/// fall back to floating point.
fn number_from_text(text: &str) -> Result<Literal, std::num::ParseFloatError> {
    if !text.contains('.') {
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Literal::Integer(i));
        }
    }
    text.parse::<f64>().map(Literal::Float)
}

#[tracing::instrument(level = "debug", skip(input))]
fn parse_number_literal(input: &str) -> ParserResult<Literal> {
    context(
        "number literal",
        map_res(
            recognize(pair(digit1, opt(pair(char('.'), digit1)))),
            number_from_text,
        ),
    )(input)
}

#[tracing::instrument(level = "debug", skip(input))]
pub fn parse_literal(input: &str) -> ParserResult<Token> {
    context(
        "literal",
        map(
            alt((parse_string_literal, parse_number_literal)),
            Token::Literal,
        ),
    )(input)
}
