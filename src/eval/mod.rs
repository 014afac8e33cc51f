//! Expression Evaluation
//!
//! # Core Components
//!
//! ## Evaluation Context
//! The variable environment, its strictness [`Mode`](crate::types::Mode), and
//! the access log that records which variables an evaluation read. Frozen
//! [`ContextSnapshot`]s are what crosses thread boundaries.
//!
//! ## Expression Evaluator
//! Walks an [`ExpressionNode`](crate::ast::ExpressionNode) tree, resolving
//! operator semantics through the [`types`](crate::types) layer.
//!
//! # Failure Containment
//!
//! A unary or binary node that fails degrades to `false` and evaluation goes
//! on. [`ExpressionEvaluator::try_evaluate`] is the strict variant that
//! surfaces the error instead.

pub mod context;
pub mod evaluator;

pub use context::{ContextSnapshot, EvaluationContext};
pub use evaluator::ExpressionEvaluator;

use thiserror::Error;

use crate::error::ErrorKind;
use crate::types::CoercionError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error(transparent)]
    Coercion(#[from] CoercionError),
    #[error("Evaluation failed: {0}")]
    Failed(String),
}

impl EvalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EvalError::Coercion(e) => e.kind(),
            EvalError::Failed(_) => ErrorKind::EvaluationFailed,
        }
    }
}

pub type EvalResult<T> = Result<T, EvalError>;
