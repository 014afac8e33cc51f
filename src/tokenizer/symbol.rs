//! # Symbol Token Handling
//!
//! Operators and parentheses. Symbols are matched longest first so that
//! `===` is never read as `==` followed by `=`, nor `<=` as `<` and `=`.

use strum_macros::{AsRefStr, Display, EnumString};

use nom::{
    branch::alt,
    bytes::complete::tag,
    combinator::{map, value},
    error::context,
};

use super::token::{ParserResult, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr)]
pub enum Operator {
    /// Strict equality (`===`)
    #[strum(serialize = "===")]
    StrictEqual,
    /// Strict inequality (`!==`)
    #[strum(serialize = "!==")]
    StrictNotEqual,
    /// Equality (`==`)
    #[strum(serialize = "==")]
    EqualEqual,
    /// Inequality (`!=`)
    #[strum(serialize = "!=")]
    NotEqual,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = ">=")]
    GreaterEqual,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = "<=")]
    LessEqual,

    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "%")]
    Modulo,

    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
    #[strum(serialize = "!")]
    Not,
    /// Bitwise complement (`~`)
    #[strum(serialize = "~")]
    Tilde,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr)]
pub enum Delimiter {
    #[strum(serialize = "(")]
    OpenParen,
    #[strum(serialize = ")")]
    CloseParen,
}

#[tracing::instrument(level = "debug", skip(input))]
pub fn parse_operator(input: &str) -> ParserResult<Token> {
    context(
        "operator",
        map(
            alt((
                // three characters
                value(Operator::StrictEqual, tag("===")),
                value(Operator::StrictNotEqual, tag("!==")),
                // two characters
                value(Operator::EqualEqual, tag("==")),
                value(Operator::NotEqual, tag("!=")),
                value(Operator::GreaterEqual, tag(">=")),
                value(Operator::LessEqual, tag("<=")),
                value(Operator::And, tag("&&")),
                value(Operator::Or, tag("||")),
                // one character
                value(Operator::Greater, tag(">")),
                value(Operator::Less, tag("<")),
                value(Operator::Plus, tag("+")),
                value(Operator::Minus, tag("-")),
                value(Operator::Multiply, tag("*")),
                value(Operator::Divide, tag("/")),
                value(Operator::Modulo, tag("%")),
                value(Operator::Not, tag("!")),
                value(Operator::Tilde, tag("~")),
            )),
            Token::Operator,
        ),
    )(input)
}

#[tracing::instrument(level = "debug", skip(input))]
pub fn parse_delimiter(input: &str) -> ParserResult<Token> {
    context(
        "delimiter",
        map(
            alt((
                value(Delimiter::OpenParen, tag("(")),
                value(Delimiter::CloseParen, tag(")")),
            )),
            Token::Delimiter,
        ),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_match_first() {
        let test_cases = vec![
            ("===x", Operator::StrictEqual, "x"),
            ("!==", Operator::StrictNotEqual, ""),
            ("== 1", Operator::EqualEqual, " 1"),
            ("!=", Operator::NotEqual, ""),
            ("!x", Operator::Not, "x"),
            ("<=3", Operator::LessEqual, "3"),
            ("<3", Operator::Less, "3"),
            (">=", Operator::GreaterEqual, ""),
            ("&&", Operator::And, ""),
            ("||", Operator::Or, ""),
            ("~1", Operator::Tilde, "1"),
            ("%2", Operator::Modulo, "2"),
        ];
        for (input, expected, rest) in test_cases {
            let (remaining, token) = parse_operator(input).unwrap();
            assert_eq!(token, Token::Operator(expected), "input: {}", input);
            assert_eq!(remaining, rest);
        }
    }

    #[test]
    fn test_single_ampersand_is_not_an_operator() {
        assert!(parse_operator("& b").is_err());
        assert!(parse_operator("| b").is_err());
        assert!(parse_operator("=").is_err());
    }

    #[test]
    fn test_parse_delimiter() {
        assert_eq!(
            parse_delimiter("(a").unwrap(),
            ("a", Token::Delimiter(Delimiter::OpenParen))
        );
        assert_eq!(
            parse_delimiter(")").unwrap(),
            ("", Token::Delimiter(Delimiter::CloseParen))
        );
    }

    #[test]
    fn test_operator_display() {
        assert_eq!(Operator::StrictNotEqual.to_string(), "!==");
        assert_eq!(Delimiter::CloseParen.as_ref(), ")");
    }
}
