use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;

use crate::types::{DefaultTypeCoercion, Mode, TypeCoercion, Value};

lazy_static! {
    static ref DEFAULT_COERCION: Arc<dyn TypeCoercion> = Arc::new(DefaultTypeCoercion::new());
}

/// Identity of the built-in coercion rules.
pub const DEFAULT_COERCION_ID: u64 = 0;
static NEXT_COERCION_ID: AtomicU64 = AtomicU64::new(DEFAULT_COERCION_ID + 1);

/// Variable environment of one evaluation thread.
///
/// Every read through [`EvaluationContext::get`] lands in the access log,
/// whether or not the variable exists. The mode is fixed at construction.
///
/// The context is owned by a single thread. Anything that crosses a thread
/// boundary goes through [`EvaluationContext::snapshot`].
#[derive(Clone)]
pub struct EvaluationContext {
    variables: HashMap<String, Value>,
    mode: Mode,
    coercion: Arc<dyn TypeCoercion>,
    coercion_id: u64,
    access_log: BTreeSet<String>,
}

impl fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("variables", &self.variables)
            .field("mode", &self.mode)
            .field("access_log", &self.access_log)
            .finish()
    }
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::new(Mode::default())
    }
}

impl EvaluationContext {
    pub fn new(mode: Mode) -> Self {
        Self {
            variables: HashMap::new(),
            mode,
            coercion: DEFAULT_COERCION.clone(),
            coercion_id: DEFAULT_COERCION_ID,
            access_log: BTreeSet::new(),
        }
    }

    pub fn with_variables<K, V>(mode: Mode, variables: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let mut context = Self::new(mode);
        for (name, value) in variables {
            context.set_variable(name, value);
        }
        context
    }

    /// Replaces the coercion rules. Each call gets a fresh
    /// [`EvaluationContext::coercion_id`], so cached results never cross rule sets.
    pub fn with_coercion(mut self, coercion: Arc<dyn TypeCoercion>) -> Self {
        self.coercion = coercion;
        self.coercion_id = NEXT_COERCION_ID.fetch_add(1, Ordering::Relaxed);
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn coercion(&self) -> &dyn TypeCoercion {
        self.coercion.as_ref()
    }

    pub fn coercion_id(&self) -> u64 {
        self.coercion_id
    }

    /// Reads a variable and records the access. Absent variables read as null.
    pub fn get(&mut self, name: &str) -> Value {
        if !self.access_log.contains(name) {
            self.access_log.insert(name.to_string());
        }
        self.variables.get(name).cloned().unwrap_or_default()
    }

    /// Reads a variable without recording the access.
    pub fn peek(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn remove_variable(&mut self, name: &str) -> Option<Value> {
        self.variables.remove(name)
    }

    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    pub fn clear_access_log(&mut self) {
        self.access_log.clear();
    }

    pub fn accessed(&self) -> &BTreeSet<String> {
        &self.access_log
    }

    /// Current values of every recorded dependency; absent names map to null.
    pub fn dependency_snapshot(&self) -> BTreeMap<String, Value> {
        self.access_log
            .iter()
            .map(|name| {
                let value = self.variables.get(name).cloned().unwrap_or_default();
                (name.clone(), value)
            })
            .collect()
    }

    /// Deep copy of the whole environment.
    pub fn variables_snapshot(&self) -> BTreeMap<String, Value> {
        self.variables
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Frozen deep copy for handoff to another thread.
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            variables: Arc::new(self.variables_snapshot()),
            mode: self.mode,
            coercion: self.coercion.clone(),
            coercion_id: self.coercion_id,
            taken_at: Utc::now(),
        }
    }
}

/// Immutable view of an [`EvaluationContext`] at one instant.
///
/// Cloning shares the frozen map. There are no setters; a worker that needs
/// to evaluate against it calls [`ContextSnapshot::to_context`] for a private
/// mutable copy.
#[derive(Clone)]
pub struct ContextSnapshot {
    variables: Arc<BTreeMap<String, Value>>,
    mode: Mode,
    coercion: Arc<dyn TypeCoercion>,
    coercion_id: u64,
    taken_at: DateTime<Utc>,
}

impl fmt::Debug for ContextSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSnapshot")
            .field("variables", &self.variables)
            .field("mode", &self.mode)
            .field("taken_at", &self.taken_at)
            .finish()
    }
}

impl ContextSnapshot {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn variables(&self) -> &BTreeMap<String, Value> {
        &self.variables
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn to_context(&self) -> EvaluationContext {
        EvaluationContext {
            variables: self
                .variables
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            mode: self.mode,
            coercion: self.coercion.clone(),
            coercion_id: self.coercion_id,
            access_log: BTreeSet::new(),
        }
    }
}
