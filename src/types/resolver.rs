use std::fmt;

use dashmap::DashMap;
use tracing::trace;

use super::{CoercionError, CoercionResult, Kind, Mode, Value};
use crate::ast::{BinaryOperator, UnaryOperator};

/// Target kinds for an operator application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoercionPlan {
    pub left: Kind,
    pub right: Kind,
    pub result: Kind,
}

impl CoercionPlan {
    pub fn new(left: Kind, right: Kind, result: Kind) -> Self {
        Self {
            left,
            right,
            result,
        }
    }

    fn uniform(kind: Kind) -> Self {
        Self::new(kind, kind, kind)
    }

    fn predicate(operand: Kind) -> Self {
        Self::new(operand, operand, Kind::Boolean)
    }
}

impl fmt::Display for CoercionPlan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {}) -> {}", self.left, self.right, self.result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKey {
    Unary(UnaryOperator),
    Binary(BinaryOperator),
}

impl fmt::Display for OperatorKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OperatorKey::Unary(op) => write!(f, "{}", op),
            OperatorKey::Binary(op) => write!(f, "{}", op),
        }
    }
}

/// Resolves coercion plans for operator applications.
///
/// Unary operators pass the operand kind as both `left` and `right`.
pub trait TypeResolver: Send + Sync + fmt::Debug {
    fn resolve(
        &self,
        op: OperatorKey,
        left: Kind,
        right: Kind,
        mode: Mode,
    ) -> CoercionResult<CoercionPlan>;

    /// Truthiness of a condition result. Strings are true unless empty or
    /// `"false"`.
    fn is_truthy(&self, value: &Value) -> bool {
        match value {
            Value::String(s) => !s.is_empty() && !s.eq_ignore_ascii_case("false"),
            other => other.truthy(),
        }
    }
}

type PlanKey = (OperatorKey, Kind, Kind, Mode);

/// Plan table with a concurrent memo keyed by `(operator, left, right, mode)`.
///
/// Failed resolutions are memoized as well; the domain is finite.
#[derive(Debug, Default)]
pub struct DefaultTypeResolver {
    cache: DashMap<PlanKey, CoercionResult<CoercionPlan>>,
}

impl DefaultTypeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached_plans(&self) -> usize {
        self.cache.len()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    fn compute_plan(
        op: OperatorKey,
        left: Kind,
        right: Kind,
        mode: Mode,
    ) -> CoercionResult<CoercionPlan> {
        let loose = mode == Mode::Loose;
        let mismatch = || CoercionError::TypeMismatch {
            operator: op.to_string(),
            left: left.to_string(),
            right: right.to_string(),
        };

        match op {
            OperatorKey::Unary(UnaryOperator::Not) => Ok(CoercionPlan::uniform(Kind::Boolean)),
            OperatorKey::Unary(UnaryOperator::Minus | UnaryOperator::Plus) => match left {
                Kind::Number | Kind::Boolean => Ok(CoercionPlan::uniform(Kind::Number)),
                Kind::Null => Ok(CoercionPlan::uniform(Kind::Null)),
                Kind::String if loose => Ok(CoercionPlan::uniform(Kind::Number)),
                _ => Err(mismatch()),
            },
            OperatorKey::Unary(UnaryOperator::BitNot) => match left {
                Kind::Number => Ok(CoercionPlan::uniform(Kind::Number)),
                Kind::Null => Ok(CoercionPlan::uniform(Kind::Null)),
                k if loose && k.can_be_number() => Ok(CoercionPlan::uniform(Kind::Number)),
                _ => Err(mismatch()),
            },
            OperatorKey::Binary(op) if op.is_arithmetic() => {
                if left == Kind::Number && right == Kind::Number {
                    Ok(CoercionPlan::uniform(Kind::Number))
                } else if op == BinaryOperator::Add
                    && (left == Kind::String || right == Kind::String)
                {
                    Ok(CoercionPlan::uniform(Kind::String))
                } else if loose && left.can_be_number() && right.can_be_number() {
                    Ok(CoercionPlan::uniform(Kind::Number))
                } else {
                    Err(mismatch())
                }
            }
            OperatorKey::Binary(op) if op.is_relational() => {
                if (left == Kind::Number && right == Kind::Number)
                    || (loose && left.can_be_number() && right.can_be_number())
                {
                    Ok(CoercionPlan::predicate(Kind::Number))
                } else {
                    Err(mismatch())
                }
            }
            OperatorKey::Binary(BinaryOperator::Equal | BinaryOperator::NotEqual) => {
                if left == right {
                    Ok(CoercionPlan::predicate(Kind::Other))
                } else if left == Kind::Number && right == Kind::Number {
                    Ok(CoercionPlan::predicate(Kind::Number))
                } else if loose {
                    Ok(CoercionPlan::predicate(Kind::String))
                } else {
                    Ok(CoercionPlan::predicate(Kind::Other))
                }
            }
            OperatorKey::Binary(BinaryOperator::StrictEqual | BinaryOperator::StrictNotEqual) => {
                Ok(CoercionPlan::predicate(Kind::Other))
            }
            OperatorKey::Binary(BinaryOperator::And | BinaryOperator::Or) => {
                Ok(CoercionPlan::uniform(Kind::Boolean))
            }
            OperatorKey::Binary(_) => Err(mismatch()),
        }
    }
}

impl TypeResolver for DefaultTypeResolver {
    fn resolve(
        &self,
        op: OperatorKey,
        left: Kind,
        right: Kind,
        mode: Mode,
    ) -> CoercionResult<CoercionPlan> {
        let key = (op, left, right, mode);
        if let Some(plan) = self.cache.get(&key) {
            return plan.clone();
        }
        self.cache
            .entry(key)
            .or_insert_with(|| {
                let plan = Self::compute_plan(op, left, right, mode);
                trace!("resolved plan {} {} {} {}: {:?}", op, left, right, mode, plan);
                plan
            })
            .clone()
    }
}
