//! # Expression Engine
//!
//! Owns the services shared by every condition: the AST cache keyed by
//! source text, the evaluation cache keyed by expression identity, the hit
//! and miss counters, and the evaluator. Engines are built explicitly and
//! shared through `Arc`; there is no process-wide instance.
//!
//! ```
//! use trigger_engine::engine::ExpressionEngine;
//! use trigger_engine::eval::EvaluationContext;
//! use trigger_engine::types::{Mode, Value};
//!
//! let engine = ExpressionEngine::new(Mode::Strict);
//! let expression = engine.compile("hp * 2 > 10");
//! let mut context = EvaluationContext::with_variables(Mode::Strict, [("hp", 6)]);
//!
//! let first = engine.evaluate_cached(&expression, &mut context, "hp");
//! let second = engine.evaluate_cached(&expression, &mut context, "hp");
//! assert_eq!(first.value(), &Value::Boolean(true));
//! assert!(!first.hit && second.hit);
//! ```

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tracing::{debug, trace, warn};

use crate::ast::{CompiledExpression, ExpressionNode};
use crate::cache::{
    CacheStats, CacheStatsTracker, EvaluationResult, ExprCacheKey, ExprCacheManager,
    DEFAULT_CAPACITY,
};
use crate::config::EngineConfig;
use crate::eval::{EvalResult, EvaluationContext, ExpressionEvaluator};
use crate::parser::{self, ParserResult};
use crate::types::{DefaultTypeResolver, Mode, TypeResolver, Value};

/// Outcome of a cache lookup.
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub result: Arc<EvaluationResult>,
    pub hit: bool,
}

impl CacheLookup {
    pub fn value(&self) -> &Value {
        &self.result.value
    }
}

#[derive(Debug)]
pub struct ExpressionEngine {
    mode: Mode,
    ast_cache: DashMap<String, Arc<CompiledExpression>>,
    eval_cache: ExprCacheManager,
    stats: CacheStatsTracker,
    evaluator: ExpressionEvaluator,
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        Self::new(Mode::default())
    }
}

impl ExpressionEngine {
    pub fn new(mode: Mode) -> Self {
        Self::with_parts(
            mode,
            DEFAULT_CAPACITY,
            Arc::new(DefaultTypeResolver::new()),
        )
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_parts(
            config.mode,
            config.eval_cache_capacity,
            Arc::new(DefaultTypeResolver::new()),
        )
    }

    pub fn with_parts(mode: Mode, capacity: usize, resolver: Arc<dyn TypeResolver>) -> Self {
        Self {
            mode,
            ast_cache: DashMap::new(),
            eval_cache: ExprCacheManager::new(capacity),
            stats: CacheStatsTracker::new(),
            evaluator: ExpressionEvaluator::new(resolver),
        }
    }

    /// Default mode for contexts created on behalf of this engine.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn new_context(&self) -> EvaluationContext {
        EvaluationContext::new(self.mode)
    }

    pub fn resolver(&self) -> &Arc<dyn TypeResolver> {
        self.evaluator.resolver()
    }

    /// Parses without touching the AST cache.
    pub fn parse(&self, source: &str) -> ParserResult<ExpressionNode> {
        parser::parse(source)
    }

    /// Returns the cached compilation of `source`, parsing it on first use.
    ///
    /// Text that fails to parse compiles to a constant `false`, which is
    /// cached like any other result.
    pub fn compile(&self, source: &str) -> Arc<CompiledExpression> {
        if let Some(compiled) = self.ast_cache.get(source) {
            return compiled.clone();
        }
        self.ast_cache
            .entry(source.to_string())
            .or_insert_with(|| {
                let root = match parser::parse(source) {
                    Ok(root) => root,
                    Err(e) => {
                        warn!(kind = %e.kind(), "`{}` replaced by false: {}", source, e);
                        ExpressionNode::constant_false()
                    }
                };
                Arc::new(CompiledExpression::new(source, root))
            })
            .clone()
    }

    /// Evaluates without consulting the evaluation cache.
    pub fn evaluate(&self, node: &ExpressionNode, context: &mut EvaluationContext) -> Value {
        self.evaluator.evaluate(node, context)
    }

    pub fn try_evaluate(
        &self,
        node: &ExpressionNode,
        context: &mut EvaluationContext,
    ) -> EvalResult<Value> {
        self.evaluator.try_evaluate(node, context)
    }

    /// Returns the cached result when its dependencies still match the live
    /// context, otherwise re-evaluates and replaces the entry.
    ///
    /// `label` names the caller in the per-trigger counters.
    pub fn evaluate_cached(
        &self,
        expression: &CompiledExpression,
        context: &mut EvaluationContext,
        label: &str,
    ) -> CacheLookup {
        let key = ExprCacheKey::for_context(expression, context);

        if let Some(cached) = self.eval_cache.get(&key) {
            if !cached.is_outdated(context.variables()) {
                trace!("cache hit {} for {}", key, label);
                self.stats.record_hit(label);
                return CacheLookup {
                    result: cached,
                    hit: true,
                };
            }
            debug!("dependencies of `{}` changed", expression);
        }

        context.clear_access_log();
        let started = Instant::now();
        let value = self.evaluator.evaluate(expression.root(), context);
        let result = EvaluationResult::capture(value, context, started.elapsed());
        let result = self.eval_cache.put(key, result);
        self.stats.record_miss(label);
        CacheLookup { result, hit: false }
    }

    pub fn clear_ast_cache(&self) {
        self.ast_cache.clear();
    }

    pub fn ast_cache_size(&self) -> usize {
        self.ast_cache.len()
    }

    pub fn clear_eval_cache(&self) {
        self.eval_cache.clear();
    }

    pub fn eval_cache(&self) -> &ExprCacheManager {
        &self.eval_cache
    }

    pub fn stats(&self) -> &CacheStatsTracker {
        &self.stats
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.stats.snapshot()
    }
}
