//! # Trigger Model
//!
//! A [`Trigger`] pairs a check with an optional side effect. The check comes
//! from one of three [`TriggerKind`]s:
//!
//! * `Expression`: a single [`Condition`].
//! * `Composite`: a [`CompositeTrigger`] joining conditions with ALL or ANY.
//! * `Custom`: any [`TriggerBehavior`] implementation.
//!
//! Checks run on the dispatch thread against the live context. Side effects
//! run on a worker thread against a [`ContextSnapshot`].

pub mod composite;
pub mod condition;

pub use composite::{Combinator, CompositeTrigger};
pub use condition::Condition;

use std::fmt;
use std::sync::Arc;

use mockall::automock;
use thiserror::Error;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::eval::{ContextSnapshot, EvalError, EvaluationContext};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TriggerError {
    #[error("Check failed: {0}")]
    Check(String),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("Execution failed: {0}")]
    Execution(String),
}

impl TriggerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TriggerError::Check(_) => ErrorKind::EvaluationFailed,
            TriggerError::Eval(e) => e.kind(),
            TriggerError::Execution(_) => ErrorKind::DispatchTaskFailed,
        }
    }
}

pub type TriggerResult<T> = Result<T, TriggerError>;

/// Check and side-effect capability.
#[automock]
pub trait TriggerBehavior: Send + Sync {
    fn check(&self, context: &mut EvaluationContext) -> TriggerResult<bool>;

    fn execute(&self, _snapshot: &ContextSnapshot) -> TriggerResult<()> {
        Ok(())
    }
}

impl TriggerBehavior for Condition {
    fn check(&self, context: &mut EvaluationContext) -> TriggerResult<bool> {
        Ok(self.evaluate(context))
    }
}

impl TriggerBehavior for CompositeTrigger {
    fn check(&self, context: &mut EvaluationContext) -> TriggerResult<bool> {
        Ok(CompositeTrigger::check(self, context))
    }
}

pub enum TriggerKind {
    Expression(Condition),
    Composite(CompositeTrigger),
    Custom(Box<dyn TriggerBehavior>),
}

impl fmt::Debug for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::Expression(c) => f.debug_tuple("Expression").field(c).finish(),
            TriggerKind::Composite(c) => f.debug_tuple("Composite").field(c).finish(),
            TriggerKind::Custom(_) => f.write_str("Custom"),
        }
    }
}

pub type Action = Arc<dyn Fn(&ContextSnapshot) -> TriggerResult<()> + Send + Sync>;

pub struct Trigger {
    id: Uuid,
    name: String,
    kind: TriggerKind,
    action: Option<Action>,
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("has_action", &self.action.is_some())
            .finish()
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Trigger {
    pub fn new(name: impl Into<String>, kind: TriggerKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            action: None,
        }
    }

    pub fn expression(name: impl Into<String>, condition: Condition) -> Self {
        Self::new(name, TriggerKind::Expression(condition))
    }

    pub fn composite(name: impl Into<String>, composite: CompositeTrigger) -> Self {
        Self::new(name, TriggerKind::Composite(composite))
    }

    pub fn custom(name: impl Into<String>, behavior: impl TriggerBehavior + 'static) -> Self {
        Self::new(name, TriggerKind::Custom(Box::new(behavior)))
    }

    pub fn with_action<F>(mut self, action: F) -> Self
    where
        F: Fn(&ContextSnapshot) -> TriggerResult<()> + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &TriggerKind {
        &self.kind
    }

    pub fn has_action(&self) -> bool {
        self.action.is_some()
    }
}

impl TriggerBehavior for Trigger {
    fn check(&self, context: &mut EvaluationContext) -> TriggerResult<bool> {
        match &self.kind {
            TriggerKind::Expression(condition) => {
                Ok(condition.evaluate_labeled(context, &self.name))
            }
            TriggerKind::Composite(composite) => {
                Ok(composite.check_labeled(context, &self.name))
            }
            TriggerKind::Custom(behavior) => behavior.check(context),
        }
    }

    /// Runs the custom behavior's side effect, then the attached action.
    fn execute(&self, snapshot: &ContextSnapshot) -> TriggerResult<()> {
        if let TriggerKind::Custom(behavior) = &self.kind {
            behavior.execute(snapshot)?;
        }
        match &self.action {
            Some(action) => action(snapshot),
            None => Ok(()),
        }
    }
}
