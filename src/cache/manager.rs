use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use super::{EvaluationResult, ExprCacheKey};

pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct LruState {
    entries: HashMap<ExprCacheKey, (u64, Arc<EvaluationResult>)>,
    // recency tick -> key, oldest first
    order: BTreeMap<u64, ExprCacheKey>,
    tick: u64,
}

impl LruState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

/// Bounded least-recently-used store of evaluation results.
///
/// Both `get` and `put` refresh recency. Inserting beyond capacity evicts
/// the entry that was touched longest ago.
#[derive(Debug)]
pub struct ExprCacheManager {
    capacity: usize,
    state: Mutex<LruState>,
}

impl Default for ExprCacheManager {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ExprCacheManager {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(LruState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &ExprCacheKey) -> Option<Arc<EvaluationResult>> {
        let mut state = self.lock();
        let tick = state.next_tick();
        let (old_tick, result) = match state.entries.get_mut(key) {
            Some(entry) => {
                let old = entry.0;
                entry.0 = tick;
                (old, entry.1.clone())
            }
            None => return None,
        };
        state.order.remove(&old_tick);
        state.order.insert(tick, *key);
        Some(result)
    }

    /// Stores `result` under `key`, replacing any previous entry.
    pub fn put(&self, key: ExprCacheKey, result: EvaluationResult) -> Arc<EvaluationResult> {
        let result = Arc::new(result);
        let mut state = self.lock();
        let tick = state.next_tick();
        if let Some((old_tick, _)) = state.entries.insert(key, (tick, result.clone())) {
            state.order.remove(&old_tick);
        }
        state.order.insert(tick, key);

        while state.entries.len() > self.capacity {
            match state.order.pop_first() {
                Some((_, evicted)) => {
                    state.entries.remove(&evicted);
                    trace!("evicted cache entry {}", evicted);
                }
                None => break,
            }
        }
        result
    }

    pub fn remove(&self, key: &ExprCacheKey) -> Option<Arc<EvaluationResult>> {
        let mut state = self.lock();
        let (tick, result) = state.entries.remove(key)?;
        state.order.remove(&tick);
        Some(result)
    }

    pub fn contains(&self, key: &ExprCacheKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.order.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CompiledExpression, ExpressionNode};
    use crate::types::{Mode, Value};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn result(value: i64) -> EvaluationResult {
        EvaluationResult {
            value: Value::Integer(value),
            dependencies: BTreeMap::new(),
            eval_duration: Duration::from_micros(1),
            mode: Mode::Strict,
            timestamp: chrono::Utc::now(),
        }
    }

    fn keys(n: usize) -> (Vec<CompiledExpression>, Vec<ExprCacheKey>) {
        let expressions: Vec<_> = (0..n)
            .map(|i| CompiledExpression::new(format!("e{}", i), ExpressionNode::literal(i as i64)))
            .collect();
        let keys = expressions
            .iter()
            .map(|e| ExprCacheKey::new(e, Mode::Strict))
            .collect();
        (expressions, keys)
    }

    #[test]
    fn test_put_overwrites() {
        let (_exprs, keys) = keys(1);
        let cache = ExprCacheManager::new(4);
        cache.put(keys[0], result(1));
        cache.put(keys[0], result(2));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&keys[0]).unwrap().value, Value::Integer(2));
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let (_exprs, keys) = keys(4);
        let cache = ExprCacheManager::new(3);
        cache.put(keys[0], result(0));
        cache.put(keys[1], result(1));
        cache.put(keys[2], result(2));

        // touch 0 so that 1 becomes the oldest
        assert!(cache.get(&keys[0]).is_some());
        cache.put(keys[3], result(3));

        assert_eq!(cache.len(), 3);
        assert!(cache.contains(&keys[0]));
        assert!(!cache.contains(&keys[1]));
        assert!(cache.contains(&keys[2]));
        assert!(cache.contains(&keys[3]));
    }

    #[test]
    fn test_remove_and_clear() {
        let (_exprs, keys) = keys(2);
        let cache = ExprCacheManager::default();
        assert_eq!(cache.capacity(), DEFAULT_CAPACITY);
        cache.put(keys[0], result(0));
        cache.put(keys[1], result(1));
        assert!(cache.remove(&keys[0]).is_some());
        assert!(cache.remove(&keys[0]).is_none());
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get(&keys[1]).is_none());
    }

    #[test]
    fn test_zero_capacity_keeps_one_entry() {
        let (_exprs, keys) = keys(2);
        let cache = ExprCacheManager::new(0);
        cache.put(keys[0], result(0));
        cache.put(keys[1], result(1));
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&keys[1]));
    }
}
