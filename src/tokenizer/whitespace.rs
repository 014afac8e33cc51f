use nom::{bytes::complete::take_while1, combinator::map, error::context};

use super::token::{ParserResult, Token};

/// Parses a run of spaces, tabs and line breaks into one whitespace token.
#[tracing::instrument(level = "debug", skip(input))]
pub fn parse_whitespace(input: &str) -> ParserResult<Token> {
    context(
        "whitespace",
        map(take_while1(|c: char| c.is_whitespace()), |ws: &str| {
            Token::Whitespace(ws.to_string())
        }),
    )(input)
}
