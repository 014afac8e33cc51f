use std::{cmp::Ordering, fmt};

use super::{value::parse_numeric, CoercionError, CoercionResult, Value};
use crate::ast::BinaryOperator;

/// Conversion and permissive operator rules.
///
/// These rules are what the evaluator falls back to when no coercion plan
/// applies, and what it uses to convert operands once a plan names the
/// target kinds.
pub trait TypeCoercion: Send + Sync + fmt::Debug {
    /// Number conversion: null is 0, booleans are 1/0, strings parse or
    /// become 0. Other values are 0.
    fn to_number(&self, value: &Value) -> Value;

    /// Boolean conversion: strings are true only for `true`, `1` or `yes`.
    fn to_boolean(&self, value: &Value) -> bool;

    /// Text rendering, with null as `"null"`.
    fn to_text(&self, value: &Value) -> String;

    /// Numeric addition when both sides are numeric-like, otherwise concatenation.
    fn add(&self, left: &Value, right: &Value) -> CoercionResult<Value>;
    fn subtract(&self, left: &Value, right: &Value) -> CoercionResult<Value>;
    fn multiply(&self, left: &Value, right: &Value) -> CoercionResult<Value>;
    fn divide(&self, left: &Value, right: &Value) -> CoercionResult<Value>;
    fn remainder(&self, left: &Value, right: &Value) -> CoercionResult<Value>;

    /// Identical runtime kind and equal value; numbers compare after normalization.
    fn strict_equals(&self, left: &Value, right: &Value) -> bool;

    /// `==` semantics: numeric, then boolean truthiness, then text.
    fn loose_equals(&self, left: &Value, right: &Value) -> bool;

    /// Numeric ordering; values that are not numeric-like count as 0.
    fn compare(&self, left: &Value, right: &Value) -> Option<Ordering>;
}

#[derive(Debug, Clone, Default)]
pub struct DefaultTypeCoercion;

impl DefaultTypeCoercion {
    pub fn new() -> Self {
        Self
    }

    fn numeric_pair(
        &self,
        op: BinaryOperator,
        left: &Value,
        right: &Value,
    ) -> CoercionResult<(Value, Value)> {
        match (left.numeric_like(), right.numeric_like()) {
            (Some(l), Some(r)) => Ok((l, r)),
            _ => Err(CoercionError::mismatch(op, left, right)),
        }
    }
}

impl TypeCoercion for DefaultTypeCoercion {
    fn to_number(&self, value: &Value) -> Value {
        match value {
            Value::Integer(_) | Value::Float(_) => value.clone(),
            Value::Boolean(b) => Value::Integer(*b as i64),
            Value::String(s) => parse_numeric(s).unwrap_or(Value::Integer(0)),
            _ => Value::Integer(0),
        }
    }

    fn to_boolean(&self, value: &Value) -> bool {
        match value {
            Value::String(s) => {
                let s = s.trim();
                s.eq_ignore_ascii_case("true") || s == "1" || s.eq_ignore_ascii_case("yes")
            }
            other => other.truthy(),
        }
    }

    fn to_text(&self, value: &Value) -> String {
        value.to_string()
    }

    fn add(&self, left: &Value, right: &Value) -> CoercionResult<Value> {
        match (left.numeric_like(), right.numeric_like()) {
            (Some(l), Some(r)) => Ok(apply_numeric(BinaryOperator::Add, &l, &r)),
            _ => Ok(Value::String(format!(
                "{}{}",
                self.to_text(left),
                self.to_text(right)
            ))),
        }
    }

    fn subtract(&self, left: &Value, right: &Value) -> CoercionResult<Value> {
        let (l, r) = self.numeric_pair(BinaryOperator::Subtract, left, right)?;
        Ok(apply_numeric(BinaryOperator::Subtract, &l, &r))
    }

    fn multiply(&self, left: &Value, right: &Value) -> CoercionResult<Value> {
        let (l, r) = self.numeric_pair(BinaryOperator::Multiply, left, right)?;
        Ok(apply_numeric(BinaryOperator::Multiply, &l, &r))
    }

    fn divide(&self, left: &Value, right: &Value) -> CoercionResult<Value> {
        let (l, r) = self.numeric_pair(BinaryOperator::Divide, left, right)?;
        Ok(apply_numeric(BinaryOperator::Divide, &l, &r))
    }

    fn remainder(&self, left: &Value, right: &Value) -> CoercionResult<Value> {
        let (l, r) = self.numeric_pair(BinaryOperator::Modulo, left, right)?;
        Ok(apply_numeric(BinaryOperator::Modulo, &l, &r))
    }

    fn strict_equals(&self, left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (l, r) if l.is_number() && r.is_number() => {
                match (l.clone().normalize(), r.clone().normalize()) {
                    (Value::Integer(a), Value::Integer(b)) => a == b,
                    (Value::Float(a), Value::Float(b)) => a == b,
                    _ => false,
                }
            }
            (l, r) => l.kind() == r.kind() && l == r,
        }
    }

    fn loose_equals(&self, left: &Value, right: &Value) -> bool {
        if left.is_number() && right.is_number() {
            return left.numeric_cmp(right) == Some(Ordering::Equal);
        }
        if matches!(left, Value::Boolean(_)) || matches!(right, Value::Boolean(_)) {
            return left.truthy() == right.truthy();
        }
        match (left, right) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (l, r) => self.to_text(l) == self.to_text(r),
        }
    }

    fn compare(&self, left: &Value, right: &Value) -> Option<Ordering> {
        let l = left.numeric_like().unwrap_or(Value::Integer(0));
        let r = right.numeric_like().unwrap_or(Value::Integer(0));
        l.numeric_cmp(&r)
    }
}

/// Arithmetic over two number values.
///
/// Integer pairs stay exact while the operation does not overflow. Division
/// or remainder by zero yields NaN. Results are normalized, so integral
/// floats come back as integers.
pub fn apply_numeric(op: BinaryOperator, left: &Value, right: &Value) -> Value {
    if let (Value::Integer(a), Value::Integer(b)) = (left, right) {
        let exact = match op {
            BinaryOperator::Add => a.checked_add(*b),
            BinaryOperator::Subtract => a.checked_sub(*b),
            BinaryOperator::Multiply => a.checked_mul(*b),
            BinaryOperator::Modulo if *b != 0 => a.checked_rem(*b),
            BinaryOperator::Divide if a.checked_rem(*b) == Some(0) => a.checked_div(*b),
            _ => None,
        };
        if let Some(result) = exact {
            return Value::Integer(result);
        }
    }

    let a = left.as_f64().unwrap_or(0.0);
    let b = right.as_f64().unwrap_or(0.0);
    let result = match op {
        BinaryOperator::Add => a + b,
        BinaryOperator::Subtract => a - b,
        BinaryOperator::Multiply => a * b,
        BinaryOperator::Divide if b == 0.0 => f64::NAN,
        BinaryOperator::Divide => a / b,
        BinaryOperator::Modulo if b == 0.0 => f64::NAN,
        BinaryOperator::Modulo => a % b,
        _ => f64::NAN,
    };
    Value::Float(result).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coercion() -> DefaultTypeCoercion {
        DefaultTypeCoercion::new()
    }

    #[test]
    fn test_add_numeric_or_concat() {
        let test_cases = vec![
            (Value::Integer(2), Value::Integer(3), Value::Integer(5)),
            (Value::from("2"), Value::Integer(3), Value::Integer(5)),
            (Value::from("1.5"), Value::Float(1.5), Value::Integer(3)),
            (Value::from("abc"), Value::Integer(123), Value::from("abc123")),
            (Value::Null, Value::from("x"), Value::from("nullx")),
            (Value::Boolean(true), Value::Integer(1), Value::from("true1")),
        ];
        for (l, r, expected) in test_cases {
            assert_eq!(coercion().add(&l, &r).unwrap(), expected, "{:?} + {:?}", l, r);
        }
    }

    #[test]
    fn test_arithmetic_requires_numeric_operands() {
        let c = coercion();
        assert_eq!(
            c.subtract(&Value::Integer(10), &Value::from("4")).unwrap(),
            Value::Integer(6)
        );
        assert_eq!(
            c.multiply(&Value::Float(2.5), &Value::Integer(2)).unwrap(),
            Value::Integer(5)
        );
        assert_eq!(
            c.divide(&Value::Integer(7), &Value::Integer(2)).unwrap(),
            Value::Float(3.5)
        );
        assert_eq!(
            c.remainder(&Value::Integer(10), &Value::Integer(4)).unwrap(),
            Value::Integer(2)
        );
        assert!(c.subtract(&Value::from("abc"), &Value::Integer(1)).is_err());
        assert!(c.multiply(&Value::Boolean(true), &Value::Integer(1)).is_err());
    }

    #[test]
    fn test_division_by_zero_is_nan() {
        let c = coercion();
        for result in [
            c.divide(&Value::Integer(1), &Value::Integer(0)).unwrap(),
            c.remainder(&Value::Integer(1), &Value::Integer(0)).unwrap(),
            c.divide(&Value::Float(1.0), &Value::Float(0.0)).unwrap(),
        ] {
            assert!(matches!(result, Value::Float(f) if f.is_nan()));
        }
    }

    #[test]
    fn test_integer_overflow_falls_back_to_float() {
        let result = apply_numeric(
            BinaryOperator::Add,
            &Value::Integer(i64::MAX),
            &Value::Integer(1),
        );
        assert!(matches!(result, Value::Float(_)));
    }

    #[test]
    fn test_strict_equals() {
        let c = coercion();
        assert!(c.strict_equals(&Value::Integer(5), &Value::Float(5.0)));
        assert!(c.strict_equals(&Value::Null, &Value::Null));
        assert!(c.strict_equals(&Value::from("abc"), &Value::from("abc")));
        assert!(!c.strict_equals(&Value::Integer(1), &Value::from("1")));
        assert!(!c.strict_equals(&Value::Integer(1), &Value::Boolean(true)));
        assert!(!c.strict_equals(&Value::Null, &Value::Integer(0)));
        assert!(!c.strict_equals(&Value::Float(5.5), &Value::Integer(5)));
    }

    #[test]
    fn test_loose_equals() {
        let c = coercion();
        assert!(c.loose_equals(&Value::Integer(3), &Value::Float(3.0)));
        assert!(c.loose_equals(&Value::from("1"), &Value::Integer(1)));
        assert!(c.loose_equals(&Value::Integer(1), &Value::Boolean(true)));
        assert!(c.loose_equals(&Value::Null, &Value::Null));
        assert!(!c.loose_equals(&Value::Null, &Value::from("null")));
        assert!(!c.loose_equals(&Value::from("a"), &Value::from("b")));
    }

    #[test]
    fn test_conversions() {
        let c = coercion();
        assert_eq!(c.to_number(&Value::Null), Value::Integer(0));
        assert_eq!(c.to_number(&Value::Boolean(true)), Value::Integer(1));
        assert_eq!(c.to_number(&Value::from("2.5")), Value::Float(2.5));
        assert_eq!(c.to_number(&Value::from("nope")), Value::Integer(0));
        assert!(c.to_boolean(&Value::from("YES")));
        assert!(c.to_boolean(&Value::from("1")));
        assert!(!c.to_boolean(&Value::from("on")));
        assert!(!c.to_boolean(&Value::Integer(0)));
        assert_eq!(c.to_text(&Value::Null), "null");
    }

    #[test]
    fn test_compare_treats_non_numeric_as_zero() {
        let c = coercion();
        assert_eq!(
            c.compare(&Value::from("10.5"), &Value::Integer(11)),
            Some(Ordering::Less)
        );
        assert_eq!(
            c.compare(&Value::from("abc"), &Value::Integer(0)),
            Some(Ordering::Equal)
        );
        assert_eq!(c.compare(&Value::Float(f64::NAN), &Value::Integer(0)), None);
    }
}
