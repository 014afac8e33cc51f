use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{trace, warn};

use crate::ast::CompiledExpression;
use crate::engine::ExpressionEngine;
use crate::eval::{EvalError, EvalResult, EvaluationContext};
use crate::types::{Mode, Value};

/// One expression evaluated to a boolean through the engine's caches.
#[derive(Clone)]
pub struct Condition {
    engine: Arc<ExpressionEngine>,
    compiled: Arc<CompiledExpression>,
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("expression", &self.compiled.source())
            .field("id", &self.compiled.id())
            .finish()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.compiled.source())
    }
}

impl Condition {
    pub fn new(engine: Arc<ExpressionEngine>, expression: &str) -> Self {
        let compiled = engine.compile(expression);
        Self { engine, compiled }
    }

    pub fn expression(&self) -> &str {
        self.compiled.source()
    }

    pub fn compiled(&self) -> &Arc<CompiledExpression> {
        &self.compiled
    }

    pub fn evaluate(&self, context: &mut EvaluationContext) -> bool {
        self.evaluate_labeled(context, self.compiled.source())
    }

    /// Like [`Condition::evaluate`], counting cache hits under `label`.
    /// Failures are logged and read as `false`.
    pub fn evaluate_labeled(&self, context: &mut EvaluationContext, label: &str) -> bool {
        match self.try_evaluate(context, label) {
            Ok(result) => result,
            Err(e) => {
                warn!(kind = %e.kind(), "Condition `{}` failed: {}", self, e);
                false
            }
        }
    }

    pub fn try_evaluate(&self, context: &mut EvaluationContext, label: &str) -> EvalResult<bool> {
        let lookup = panic::catch_unwind(AssertUnwindSafe(|| {
            self.engine.evaluate_cached(&self.compiled, context, label)
        }))
        .map_err(|payload| EvalError::Failed(panic_message(payload.as_ref())))?;

        let result = self.to_bool(lookup.value(), context);
        trace!("`{}` -> {} (hit: {})", self, result, lookup.hit);
        Ok(result)
    }

    fn to_bool(&self, value: &Value, context: &EvaluationContext) -> bool {
        match context.mode() {
            Mode::Strict => self.engine.resolver().is_truthy(value),
            Mode::Loose => context.coercion().to_boolean(value),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CoercionResult, DefaultTypeCoercion, TypeCoercion};
    use std::cmp::Ordering;

    fn engine() -> Arc<ExpressionEngine> {
        Arc::new(ExpressionEngine::default())
    }

    #[test]
    fn test_result_coercion_by_mode() {
        let engine = engine();
        let test_cases = vec![
            ("1 + 1", Mode::Strict, true),
            ("1 - 1", Mode::Strict, false),
            ("'yes'", Mode::Strict, true),
            ("'no'", Mode::Strict, true),
            ("'false'", Mode::Strict, false),
            ("''", Mode::Strict, false),
            ("'yes'", Mode::Loose, true),
            ("'no'", Mode::Loose, false),
            ("'TRUE'", Mode::Loose, true),
            ("missing", Mode::Loose, false),
            ("2.5", Mode::Loose, true),
        ];
        for (expression, mode, expected) in test_cases {
            let mut context = EvaluationContext::new(mode);
            let condition = Condition::new(engine.clone(), expression);
            assert_eq!(
                condition.evaluate(&mut context),
                expected,
                "expression: {} ({})",
                expression,
                mode
            );
        }
    }

    #[test]
    fn test_shares_compiled_expression_by_text() {
        let engine = engine();
        let a = Condition::new(engine.clone(), "hp < 10");
        let b = Condition::new(engine.clone(), "hp < 10");
        assert!(Arc::ptr_eq(a.compiled(), b.compiled()));
        assert_eq!(engine.ast_cache_size(), 1);
        assert_eq!(a.to_string(), "hp < 10");
    }

    #[test]
    fn test_malformed_condition_is_inert() {
        let condition = Condition::new(engine(), "hp < (10");
        let mut context = EvaluationContext::with_variables(Mode::Strict, [("hp", 1)]);
        assert!(!condition.evaluate(&mut context));
    }

    #[derive(Debug)]
    struct PanickingCoercion;

    impl TypeCoercion for PanickingCoercion {
        fn to_number(&self, _value: &Value) -> Value {
            panic!("to_number exploded")
        }
        fn to_boolean(&self, value: &Value) -> bool {
            DefaultTypeCoercion.to_boolean(value)
        }
        fn to_text(&self, value: &Value) -> String {
            DefaultTypeCoercion.to_text(value)
        }
        fn add(&self, l: &Value, r: &Value) -> CoercionResult<Value> {
            DefaultTypeCoercion.add(l, r)
        }
        fn subtract(&self, l: &Value, r: &Value) -> CoercionResult<Value> {
            DefaultTypeCoercion.subtract(l, r)
        }
        fn multiply(&self, l: &Value, r: &Value) -> CoercionResult<Value> {
            DefaultTypeCoercion.multiply(l, r)
        }
        fn divide(&self, l: &Value, r: &Value) -> CoercionResult<Value> {
            DefaultTypeCoercion.divide(l, r)
        }
        fn remainder(&self, l: &Value, r: &Value) -> CoercionResult<Value> {
            DefaultTypeCoercion.remainder(l, r)
        }
        fn strict_equals(&self, l: &Value, r: &Value) -> bool {
            DefaultTypeCoercion.strict_equals(l, r)
        }
        fn loose_equals(&self, l: &Value, r: &Value) -> bool {
            DefaultTypeCoercion.loose_equals(l, r)
        }
        fn compare(&self, l: &Value, r: &Value) -> Option<Ordering> {
            DefaultTypeCoercion.compare(l, r)
        }
    }

    #[test]
    fn test_panic_is_reported_as_evaluation_failure() {
        let condition = Condition::new(engine(), "hp - 1 > 0");
        let mut context = EvaluationContext::with_variables(Mode::Strict, [("hp", 5)])
            .with_coercion(Arc::new(PanickingCoercion));

        let err = condition.try_evaluate(&mut context, "t").unwrap_err();
        assert_eq!(err, EvalError::Failed("to_number exploded".to_string()));
        assert_eq!(err.kind(), crate::error::ErrorKind::EvaluationFailed);
        assert!(!condition.evaluate(&mut context));
    }
}
