//! # Evaluation Cache
//!
//! Results are keyed by expression identity, mode and the identity of the
//! context's coercion rules ([`ExprCacheKey`]).
//! Whether an entry is still valid depends on the live variables: an
//! [`EvaluationResult`] keeps a frozen copy of what it depended on and is
//! reused only while that copy still matches.
//!
//! * STRICT: the frozen copy is the whole environment.
//! * LOOSE: the frozen copy is the variables read during evaluation,
//!   absent ones recorded as null.

pub mod manager;
pub mod stats;

pub use manager::{ExprCacheManager, DEFAULT_CAPACITY};
pub use stats::{CacheStats, CacheStatsTracker};

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::ast::CompiledExpression;
use crate::eval::{context::DEFAULT_COERCION_ID, EvaluationContext};
use crate::types::{Mode, Value};

/// Identifies one cache slot. Contexts with custom coercion rules get their
/// own slots through [`EvaluationContext::coercion_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprCacheKey {
    expression_id: u64,
    mode: Mode,
    coercion_id: u64,
}

impl ExprCacheKey {
    /// Key for a context using the built-in coercion rules.
    pub fn new(expression: &CompiledExpression, mode: Mode) -> Self {
        Self {
            expression_id: expression.id(),
            mode,
            coercion_id: DEFAULT_COERCION_ID,
        }
    }

    pub fn for_context(expression: &CompiledExpression, context: &EvaluationContext) -> Self {
        Self {
            expression_id: expression.id(),
            mode: context.mode(),
            coercion_id: context.coercion_id(),
        }
    }

    pub fn expression_id(&self) -> u64 {
        self.expression_id
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn coercion_id(&self) -> u64 {
        self.coercion_id
    }
}

impl fmt::Display for ExprCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.coercion_id == DEFAULT_COERCION_ID {
            write!(f, "#{}/{}", self.expression_id, self.mode)
        } else {
            write!(f, "#{}/{}/c{}", self.expression_id, self.mode, self.coercion_id)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub value: Value,
    pub dependencies: BTreeMap<String, Value>,
    pub eval_duration: Duration,
    pub mode: Mode,
    pub timestamp: DateTime<Utc>,
}

impl EvaluationResult {
    /// Captures the result of an evaluation that just ran against `context`.
    pub fn capture(value: Value, context: &EvaluationContext, eval_duration: Duration) -> Self {
        let dependencies = match context.mode() {
            Mode::Strict => context.variables_snapshot(),
            Mode::Loose => context.dependency_snapshot(),
        };
        Self {
            value,
            dependencies,
            eval_duration,
            mode: context.mode(),
            timestamp: Utc::now(),
        }
    }

    /// True when the live environment no longer matches the frozen copy.
    pub fn is_outdated(&self, live: &HashMap<String, Value>) -> bool {
        match self.mode {
            Mode::Strict => {
                live.len() != self.dependencies.len()
                    || self.dependencies.iter().any(|(name, value)| {
                        live.get(name).map_or(true, |current| !unchanged(current, value))
                    })
            }
            Mode::Loose => self.dependencies.iter().any(|(name, value)| {
                !unchanged(live.get(name).unwrap_or(&Value::Null), value)
            }),
        }
    }
}

/// Equality for change detection: floats compare bit for bit, so a NaN
/// dependency matches itself.
fn unchanged(current: &Value, frozen: &Value) -> bool {
    match (current, frozen) {
        (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| unchanged(x, y))
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(k, x)| b.get(k).map_or(false, |y| unchanged(x, y)))
        }
        (a, b) => a == b,
    }
}
