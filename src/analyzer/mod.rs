//! # Analyzer
//!
//! Token-level parser combinators and the expression grammar built on them.
//!
//! Precedence, loosest first: `||`, `&&`, equality (`== != === !==`),
//! relational (`< <= > >=`), additive, multiplicative, unary (`+ - ! ~`),
//! primary. Binary levels fold left, so `a - b - c` is `(a - b) - c`.

pub mod combinators;
pub mod core;
pub mod parsers;
pub mod prelude;

pub use core::ParseError;
pub use core::ParseResult;
pub use core::Parser;
