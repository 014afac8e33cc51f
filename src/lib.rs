//! # Trigger Engine
//!
//! Evaluates small boolean and arithmetic expressions against a mutable
//! variable environment, caches results by the variables they read, and
//! fires matching triggers as prioritized work on a thread pool.
//!
//! ## Expression Pipeline
//!
//! ```text
//! Source Text → Tokenizer → Parser → ExpressionNode → Evaluator → Value
//! ```
//!
//! ### Stage 1: Tokenization
//!
//! The [`tokenizer`] module turns source text into tokens with nom
//! combinators: literals, identifiers, operators, and parentheses.
//!
//! ### Stage 2: Parsing
//!
//! The [`analyzer`] module holds the parser combinators; [`parser::parse`]
//! runs the expression grammar over the token stream and produces an
//! [`ast::ExpressionNode`].
//!
//! ### Stage 3: Evaluation
//!
//! The [`eval`] module walks the tree against an
//! [`eval::EvaluationContext`], recording which variables were read. Operator
//! semantics across kinds come from the [`types`] layer, governed by a
//! STRICT or LOOSE [`types::Mode`].
//!
//! ## Caching
//!
//! [`engine::ExpressionEngine`] owns two caches: compiled expressions by
//! source text, and evaluation results by expression identity
//! ([`cache`]). A cached result is reused only while the variables it
//! depended on still hold the same values.
//!
//! ## Triggers and Dispatch
//!
//! A [`trigger::Trigger`] wraps a condition, a composite of conditions, or
//! custom logic. The [`event::EventDispatcher`] polls triggers on the
//! calling thread and hands the side effects of those that fire to an
//! [`event::EventWorkerPool`], each with a frozen snapshot of the context.

pub mod analyzer;
pub mod ast;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod eval;
pub mod event;
pub mod parser;
pub mod tokenizer;
pub mod trigger;
pub mod types;

// Re-exports
pub use ast::*;
pub use error::*;
pub use parser::parse;

#[cfg(test)]
mod tests {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    #[ctor::ctor]
    fn init_tests() {
        // テストの前に一度だけ実行したい処理
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    }
}
