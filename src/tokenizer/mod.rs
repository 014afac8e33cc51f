//! # Tokenizer
//!
//! Lexical analysis of condition expressions. Raw text becomes a stream of
//! [`TokenSpan`](token::TokenSpan)s that the [`analyzer`](crate::analyzer)
//! consumes.
//!
//! ## Component Structure
//!
//! * [`token`]: token types, the [`Tokenizer`](token::Tokenizer) driver and identifiers
//! * [`symbol`]: operators and parentheses
//! * [`literal`]: numbers, strings, booleans and `null`
//! * [`whitespace`]: blank runs, kept as tokens so spans stay exact
//!
//! ## Surface
//!
//! Numbers are plain decimal with at most one decimal point; there is no
//! exponent or hex form and no sign (a leading `-` is the unary operator).
//! Strings are `"..."` or `'...'` with the escapes `\n`, `\t`, `\"`, `\'`
//! and `\\`. `true` and `false` match case-insensitively; `null` is
//! lowercase only.
//!
//! The stream always ends with a single [`Token::Eof`](token::Token::Eof).
//!
//! ## Usage Example
//!
//! ```
//! use trigger_engine::tokenizer::token::{Token, Tokenizer};
//!
//! let tokens = Tokenizer::new().tokenize("hp < 10").unwrap();
//! assert_eq!(tokens[0].token, Token::Identifier("hp".to_string()));
//! assert_eq!(tokens.last().unwrap().token, Token::Eof);
//! ```

pub mod literal;
pub mod symbol;
pub mod token;
pub mod whitespace;
