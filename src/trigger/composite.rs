use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::warn;

use super::condition::Condition;
use crate::eval::EvaluationContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Combinator {
    /// Conjunction, stops at the first false condition.
    All,
    /// Disjunction, stops at the first true condition.
    Any,
}

/// Ordered conditions joined by a [`Combinator`].
#[derive(Debug, Clone)]
pub struct CompositeTrigger {
    combinator: Combinator,
    conditions: Vec<Condition>,
}

impl CompositeTrigger {
    pub fn new(combinator: Combinator, conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self {
            combinator,
            conditions: conditions.into_iter().collect(),
        }
    }

    pub fn all(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self::new(Combinator::All, conditions)
    }

    pub fn any(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self::new(Combinator::Any, conditions)
    }

    pub fn combinator(&self) -> Combinator {
        self.combinator
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn check(&self, context: &mut EvaluationContext) -> bool {
        self.check_labeled(context, &self.to_string())
    }

    /// Evaluates conditions in order until the combinator is decided. An
    /// empty list is false.
    pub fn check_labeled(&self, context: &mut EvaluationContext, label: &str) -> bool {
        if self.conditions.is_empty() {
            warn!("Composite trigger `{}` has no conditions", label);
            return false;
        }
        let mut conditions = self.conditions.iter();
        match self.combinator {
            Combinator::All => conditions.all(|c| c.evaluate_labeled(context, label)),
            Combinator::Any => conditions.any(|c| c.evaluate_labeled(context, label)),
        }
    }
}

impl fmt::Display for CompositeTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joiner = match self.combinator {
            Combinator::All => " && ",
            Combinator::Any => " || ",
        };
        write!(f, "{}(", self.combinator)?;
        for (i, condition) in self.conditions.iter().enumerate() {
            if i > 0 {
                f.write_str(joiner)?;
            }
            write!(f, "{}", condition)?;
        }
        write!(f, ")")
    }
}
