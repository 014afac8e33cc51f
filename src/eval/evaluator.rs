use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, trace};

use super::{context::EvaluationContext, EvalError, EvalResult};
use crate::ast::{BinaryOperator, ExpressionNode, UnaryOperator};
use crate::types::{
    coercion::apply_numeric,
    value::{is_integral, parse_numeric},
    CoercionError, CoercionPlan, DefaultTypeResolver, Kind, OperatorKey, TypeCoercion,
    TypeResolver, Value,
};

/// Walks an expression tree against an [`EvaluationContext`].
///
/// Operands are evaluated left to right, except that `&&` and `||` skip the
/// right side once the left side decides the result. Operators first ask the
/// resolver for a [`CoercionPlan`]; without one they use the permissive rules
/// of the context's [`TypeCoercion`].
#[derive(Debug, Clone)]
pub struct ExpressionEvaluator {
    resolver: Arc<dyn TypeResolver>,
}

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self::new(Arc::new(DefaultTypeResolver::new()))
    }
}

impl ExpressionEvaluator {
    pub fn new(resolver: Arc<dyn TypeResolver>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &Arc<dyn TypeResolver> {
        &self.resolver
    }

    /// Evaluates with containment: a failing unary or binary node yields
    /// `false` in place of its result and evaluation continues.
    pub fn evaluate(&self, node: &ExpressionNode, context: &mut EvaluationContext) -> Value {
        match self.eval(node, context, true) {
            Ok(value) => value,
            // Only literals and variables remain, and neither fails.
            Err(e) => {
                debug!("Evaluation failed at the root: {}", e);
                Value::Boolean(false)
            }
        }
    }

    /// Evaluates and propagates the first failure.
    pub fn try_evaluate(
        &self,
        node: &ExpressionNode,
        context: &mut EvaluationContext,
    ) -> EvalResult<Value> {
        self.eval(node, context, false)
    }

    fn eval(
        &self,
        node: &ExpressionNode,
        context: &mut EvaluationContext,
        contain: bool,
    ) -> EvalResult<Value> {
        match node {
            ExpressionNode::Literal { value, .. } => Ok(value.clone()),
            ExpressionNode::Variable { name, .. } => Ok(context.get(name)),
            ExpressionNode::Unary { op, operand } => {
                let result = self
                    .eval(operand, context, contain)
                    .and_then(|value| self.eval_unary(*op, value, context));
                Self::contained(node, result, contain)
            }
            ExpressionNode::Binary { op, left, right } => {
                let result = self.eval_binary(*op, left, right, context, contain);
                Self::contained(node, result, contain)
            }
        }
    }

    fn contained(
        node: &ExpressionNode,
        result: EvalResult<Value>,
        contain: bool,
    ) -> EvalResult<Value> {
        match result {
            Err(e) if contain => {
                debug!(kind = %e.kind(), "`{}` degraded to false: {}", node, e);
                Ok(Value::Boolean(false))
            }
            other => other,
        }
    }

    fn eval_binary(
        &self,
        op: BinaryOperator,
        left: &ExpressionNode,
        right: &ExpressionNode,
        context: &mut EvaluationContext,
        contain: bool,
    ) -> EvalResult<Value> {
        let left_val = self.eval(left, context, contain)?;
        match op {
            BinaryOperator::And => {
                if !left_val.truthy() {
                    return Ok(Value::Boolean(false));
                }
                let right_val = self.eval(right, context, contain)?;
                Ok(Value::Boolean(right_val.truthy()))
            }
            BinaryOperator::Or => {
                if left_val.truthy() {
                    return Ok(Value::Boolean(true));
                }
                let right_val = self.eval(right, context, contain)?;
                Ok(Value::Boolean(right_val.truthy()))
            }
            _ => {
                let right_val = self.eval(right, context, contain)?;
                self.apply_binary(op, &left_val, &right_val, context)
            }
        }
    }

    fn apply_binary(
        &self,
        op: BinaryOperator,
        left: &Value,
        right: &Value,
        context: &EvaluationContext,
    ) -> EvalResult<Value> {
        let coercion = context.coercion();
        match self.resolver.resolve(
            OperatorKey::Binary(op),
            left.kind(),
            right.kind(),
            context.mode(),
        ) {
            Ok(plan) => {
                trace!("{} {} {} via plan {}", left, op, right, plan);
                Self::apply_plan(op, plan, left, right, coercion)
            }
            Err(e) => {
                debug!("No plan in {} mode ({}); using permissive coercion", context.mode(), e);
                Self::apply_permissive(op, left, right, coercion)
            }
        }
    }

    fn apply_plan(
        op: BinaryOperator,
        plan: CoercionPlan,
        left: &Value,
        right: &Value,
        coercion: &dyn TypeCoercion,
    ) -> EvalResult<Value> {
        if op.is_arithmetic() {
            return match plan.result {
                // Plans are chosen by kind, so a string operand may still fail to parse.
                Kind::Number if Self::has_text_operand(left, right) => {
                    Self::apply_permissive(op, left, right, coercion)
                }
                Kind::Number => Ok(apply_numeric(
                    op,
                    &coercion.to_number(left),
                    &coercion.to_number(right),
                )),
                _ => Ok(coercion.add(left, right)?),
            };
        }
        if op.is_relational() {
            let ordering = coercion.compare(&coercion.to_number(left), &coercion.to_number(right));
            return Ok(Value::Boolean(Self::holds(op, ordering)));
        }
        Self::apply_permissive(op, left, right, coercion)
    }

    fn apply_permissive(
        op: BinaryOperator,
        left: &Value,
        right: &Value,
        coercion: &dyn TypeCoercion,
    ) -> EvalResult<Value> {
        let value = match op {
            BinaryOperator::Add => coercion.add(left, right)?,
            BinaryOperator::Subtract => coercion.subtract(left, right)?,
            BinaryOperator::Multiply => coercion.multiply(left, right)?,
            BinaryOperator::Divide => coercion.divide(left, right)?,
            BinaryOperator::Modulo => coercion.remainder(left, right)?,
            BinaryOperator::Equal => Value::Boolean(coercion.loose_equals(left, right)),
            BinaryOperator::NotEqual => Value::Boolean(!coercion.loose_equals(left, right)),
            BinaryOperator::StrictEqual => Value::Boolean(coercion.strict_equals(left, right)),
            BinaryOperator::StrictNotEqual => {
                Value::Boolean(!coercion.strict_equals(left, right))
            }
            BinaryOperator::LessThan
            | BinaryOperator::GreaterThan
            | BinaryOperator::LessThanEqual
            | BinaryOperator::GreaterThanEqual => {
                Value::Boolean(Self::holds(op, coercion.compare(left, right)))
            }
            BinaryOperator::And => Value::Boolean(left.truthy() && right.truthy()),
            BinaryOperator::Or => Value::Boolean(left.truthy() || right.truthy()),
        };
        Ok(value)
    }

    fn has_text_operand(left: &Value, right: &Value) -> bool {
        [left, right]
            .iter()
            .any(|v| matches!(v, Value::String(s) if parse_numeric(s).is_none()))
    }

    /// Whether a relational operator holds for an ordering; NaN never does.
    fn holds(op: BinaryOperator, ordering: Option<Ordering>) -> bool {
        match (op, ordering) {
            (_, None) => false,
            (BinaryOperator::LessThan, Some(o)) => o == Ordering::Less,
            (BinaryOperator::LessThanEqual, Some(o)) => o != Ordering::Greater,
            (BinaryOperator::GreaterThan, Some(o)) => o == Ordering::Greater,
            (BinaryOperator::GreaterThanEqual, Some(o)) => o != Ordering::Less,
            _ => false,
        }
    }

    fn eval_unary(
        &self,
        op: UnaryOperator,
        value: Value,
        context: &EvaluationContext,
    ) -> EvalResult<Value> {
        if op == UnaryOperator::Not {
            return Ok(Value::Boolean(!value.truthy()));
        }
        if value.is_null() {
            return Ok(Value::Null);
        }

        let coercion = context.coercion();
        let kind = value.kind();
        let number = match self
            .resolver
            .resolve(OperatorKey::Unary(op), kind, kind, context.mode())
        {
            Ok(_) => coercion.to_number(&value),
            Err(e) if op == UnaryOperator::BitNot => return Err(e.into()),
            Err(_) => match &value {
                Value::Boolean(b) => Value::Integer(*b as i64),
                other => other.numeric_like().unwrap_or(Value::Integer(0)),
            },
        };

        match op {
            UnaryOperator::Plus => Ok(number.normalize()),
            UnaryOperator::Minus => Ok(match number {
                Value::Integer(i) => i
                    .checked_neg()
                    .map(Value::Integer)
                    .unwrap_or(Value::Float(-(i as f64))),
                Value::Float(f) => Value::Float(-f).normalize(),
                other => other,
            }),
            UnaryOperator::BitNot => match number {
                Value::Integer(i) => Ok(Value::Integer(!i)),
                Value::Float(f) if is_integral(f) => Ok(Value::Integer(!(f as i64))),
                _ => Err(EvalError::Coercion(CoercionError::Unconvertible {
                    value: value.to_string(),
                    target: Kind::Number,
                })),
            },
            UnaryOperator::Not => Ok(Value::Boolean(!value.truthy())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::parser::parse;
    use crate::types::Mode;

    fn eval_in(mode: Mode, input: &str, vars: Vec<(&str, Value)>) -> Value {
        let mut context = EvaluationContext::with_variables(mode, vars);
        ExpressionEvaluator::default().evaluate(&parse(input).unwrap(), &mut context)
    }

    fn eval(input: &str) -> Value {
        eval_in(Mode::Strict, input, vec![])
    }

    #[test]
    fn test_arithmetic() {
        let test_cases = vec![
            ("1 + 2 * 3", Value::Integer(7)),
            ("(1 + 2) * 3", Value::Integer(9)),
            ("7 / 2", Value::Float(3.5)),
            ("6 / 2", Value::Integer(3)),
            ("2.5 * 2", Value::Integer(5)),
            ("10 % 4", Value::Integer(2)),
            ("-3 + 1", Value::Integer(-2)),
            ("'abc' + 123", Value::from("abc123")),
            ("'2' + 3", Value::Integer(5)),
        ];
        for (input, expected) in test_cases {
            assert_eq!(eval(input), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_division_by_zero_is_nan() {
        assert!(matches!(eval("1 / 0"), Value::Float(f) if f.is_nan()));
        assert!(matches!(eval("5 % 0"), Value::Float(f) if f.is_nan()));
        assert_eq!(eval("1 / 0 > 0"), Value::Boolean(false));
    }

    #[test]
    fn test_comparisons_and_equality() {
        let test_cases = vec![
            ("3 < 4", true),
            ("4 <= 4", true),
            ("5 > 6", false),
            ("5 === 5.0", true),
            ("5 !== 5.0", false),
            ("'1' === 1", false),
            ("'1' == 1", true),
            ("1 == true", true),
            ("null == null", true),
            ("null === null", true),
            ("'a' != 'b'", true),
        ];
        for (input, expected) in test_cases {
            assert_eq!(eval(input), Value::Boolean(expected), "input: {}", input);
        }
    }

    #[test]
    fn test_unary() {
        let test_cases = vec![
            ("!0", Value::Boolean(true)),
            ("!2", Value::Boolean(false)),
            ("!'text'", Value::Boolean(false)),
            ("!null", Value::Boolean(true)),
            ("-null", Value::Null),
            ("-true", Value::Integer(-1)),
            ("+false", Value::Integer(0)),
            ("-'4'", Value::Integer(-4)),
            ("-'abc'", Value::Integer(0)),
            ("~5", Value::Integer(-6)),
            ("~4.0", Value::Integer(-5)),
            ("~4.5", Value::Boolean(false)),
            ("~'3'", Value::Boolean(false)),
        ];
        for (input, expected) in test_cases {
            assert_eq!(eval(input), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_loose_mode_accepts_numeric_strings() {
        assert_eq!(
            eval_in(Mode::Loose, "~'3'", vec![]),
            Value::Integer(-4)
        );
        assert_eq!(
            eval_in(Mode::Loose, "x * 2", vec![("x", Value::from("21"))]),
            Value::Integer(42)
        );
        assert_eq!(
            eval_in(Mode::Loose, "flag + 1", vec![("flag", Value::Boolean(true))]),
            Value::Integer(2)
        );
    }

    #[test]
    fn test_loose_arithmetic_rejects_non_numeric_text() {
        let evaluator = ExpressionEvaluator::default();
        let test_cases = vec!["'abc' - 1", "x * 2", "'abc' % 2", "4 / x", "true - x"];
        for input in test_cases {
            let mut context =
                EvaluationContext::with_variables(Mode::Loose, [("x", Value::from("abc"))]);
            let err = evaluator
                .try_evaluate(&parse(input).unwrap(), &mut context)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::TypeMismatch, "input: {}", input);
        }
        assert_eq!(
            eval_in(Mode::Loose, "x + 1", vec![("x", Value::from("abc"))]),
            Value::from("abc1")
        );
    }

    #[test]
    fn test_strict_mismatch_degrades_to_false() {
        assert_eq!(
            eval_in(Mode::Strict, "x - 1", vec![("x", Value::from("abc"))]),
            Value::Boolean(false)
        );
        assert_eq!(eval("('a' - 1) || 5 > 2"), Value::Boolean(true));
    }

    #[test]
    fn test_try_evaluate_propagates() {
        let mut context = EvaluationContext::new(Mode::Strict);
        let err = ExpressionEvaluator::default()
            .try_evaluate(&parse("'a' * 2").unwrap(), &mut context)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_short_circuit_skips_right_side() {
        let evaluator = ExpressionEvaluator::default();
        let mut context = EvaluationContext::with_variables(Mode::Strict, [("a", false)]);
        let value = evaluator.evaluate(&parse("a && b").unwrap(), &mut context);
        assert_eq!(value, Value::Boolean(false));
        assert!(!context.accessed().contains("b"));

        let mut context = EvaluationContext::with_variables(Mode::Strict, [("a", 1)]);
        let value = evaluator.evaluate(&parse("a || b").unwrap(), &mut context);
        assert_eq!(value, Value::Boolean(true));
        assert!(!context.accessed().contains("b"));
    }

    #[test]
    fn test_dependencies_are_recorded() {
        let evaluator = ExpressionEvaluator::default();
        let mut context = EvaluationContext::with_variables(Mode::Strict, [("time", 500)]);
        evaluator.evaluate(
            &parse("time > 1000 || state === 'falling'").unwrap(),
            &mut context,
        );
        let names: Vec<_> = context.accessed().iter().cloned().collect();
        assert_eq!(names, vec!["state".to_string(), "time".to_string()]);
    }
}
