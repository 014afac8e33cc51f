pub mod expression;

pub use expression::{parse_complete_expression, parse_expression};
