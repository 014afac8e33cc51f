//! # Value model and operator typing
//!
//! Runtime values, the strictness [`Mode`], and the two capabilities that
//! decide how operators combine values of different kinds:
//!
//! * [`TypeCoercion`]: conversions plus the permissive arithmetic and
//!   comparison rules.
//! * [`TypeResolver`]: resolves a [`CoercionPlan`] for an operator and the
//!   kinds of its operands under a mode. Plans are cached.

pub mod coercion;
pub mod resolver;
pub mod value;

pub use coercion::{DefaultTypeCoercion, TypeCoercion};
pub use resolver::{CoercionPlan, DefaultTypeResolver, OperatorKey, TypeResolver};
pub use value::Value;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::error::ErrorKind;

/// Coercion strictness, fixed per evaluation context.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Mode {
    /// Arithmetic and relational operators require numeric operands; the
    /// evaluation cache compares the whole environment.
    #[default]
    Strict,
    /// Numeric-looking strings, booleans and null convert to numbers; the
    /// evaluation cache compares only recorded dependencies.
    Loose,
}

/// Coarse runtime kind of a [`Value`], the domain of plan resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Kind {
    Null,
    Number,
    String,
    Boolean,
    Other,
}

impl Kind {
    /// Whether a value of this kind converts to a number in loose mode.
    pub fn can_be_number(&self) -> bool {
        !matches!(self, Kind::Other)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoercionError {
    #[error("Operator {operator} not applicable to {left} and {right}")]
    TypeMismatch {
        operator: String,
        left: String,
        right: String,
    },
    #[error("Cannot coerce {value} to {target}")]
    Unconvertible { value: String, target: Kind },
}

impl CoercionError {
    pub fn mismatch(operator: impl ToString, left: &Value, right: &Value) -> Self {
        CoercionError::TypeMismatch {
            operator: operator.to_string(),
            left: left.kind().to_string(),
            right: right.kind().to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::TypeMismatch
    }
}

pub type CoercionResult<T> = Result<T, CoercionError>;
