use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::log::{EventLogRecord, EventLogger, LogLevel};
use super::pool::EventWorkerPool;
use super::task::{EventTask, Priority};
use super::{PoolError, PoolResult};
use crate::config::EngineConfig;
use crate::eval::EvaluationContext;
use crate::trigger::condition::panic_message;
use crate::trigger::{Trigger, TriggerBehavior, TriggerError};
use crate::types::Value;

const SOURCE: &str = "EventDispatcher";

/// Polls registered triggers against a live context it owns and hands the
/// side effects of those that fire to a worker pool.
///
/// Polling is synchronous on the calling thread. Each fired trigger gets
/// its own snapshot of the context taken at the moment it fired.
pub struct EventDispatcher {
    context: EvaluationContext,
    triggers: Vec<Arc<Trigger>>,
    pool: EventWorkerPool,
    logger: Arc<dyn EventLogger>,
}

impl EventDispatcher {
    pub fn new(
        context: EvaluationContext,
        pool_size: usize,
        logger: Arc<dyn EventLogger>,
    ) -> PoolResult<Self> {
        let pool = EventWorkerPool::new(pool_size, logger.clone())?;
        Ok(Self {
            context,
            triggers: Vec::new(),
            pool,
            logger,
        })
    }

    pub fn from_config(config: &EngineConfig, logger: Arc<dyn EventLogger>) -> PoolResult<Self> {
        Self::new(
            EvaluationContext::new(config.mode),
            config.worker_pool_size,
            logger,
        )
    }

    pub fn register(&mut self, trigger: Trigger) -> Uuid {
        let id = trigger.id();
        info!("[{}] Registered trigger `{}` ({})", SOURCE, trigger.name(), id);
        self.triggers.push(Arc::new(trigger));
        id
    }

    /// Runs one dispatch cycle and returns how many triggers fired.
    pub fn poll_and_dispatch(&mut self) -> usize {
        let mut fired = 0;
        for trigger in &self.triggers {
            let started = Instant::now();
            let success = check(trigger, &mut self.context);
            let elapsed = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);

            let level = if success {
                LogLevel::Info
            } else {
                LogLevel::Debug
            };
            self.logger.record(
                EventLogRecord::new(
                    SOURCE,
                    trigger.name(),
                    success,
                    elapsed,
                    self.context.variables_snapshot(),
                )
                .with_level(level),
            );

            if !success {
                debug!("[{}] Trigger skipped: {}", SOURCE, trigger);
                continue;
            }

            let task = execution_task(trigger.clone(), &self.context, self.logger.clone());
            if self.pool.submit(task) {
                fired += 1;
                debug!("[{}] Trigger fired and submitted: {}", SOURCE, trigger);
            }
        }
        fired
    }

    /// Submits an arbitrary action straight to the pool.
    pub fn dispatch<F>(&self, action: F, priority: Priority) -> bool
    where
        F: FnOnce() -> PoolResult<()> + Send + 'static,
    {
        let task = EventTask::new(priority, action);
        let id = task.id();
        let submitted = self.pool.submit(task);
        if submitted {
            debug!("[{}] Direct dispatch: {} (priority={})", SOURCE, id, priority);
        }
        submitted
    }

    pub fn registered_count(&self) -> usize {
        self.triggers.len()
    }

    pub fn triggers(&self) -> impl Iterator<Item = &Trigger> {
        self.triggers.iter().map(|t| t.as_ref())
    }

    pub fn clear(&mut self) {
        self.triggers.clear();
    }

    /// Stops the pool. Only the call that actually stops it is recorded.
    pub fn shutdown_workers(&self) -> bool {
        if !self.pool.shutdown() {
            return false;
        }
        self.logger.record(EventLogRecord::new(
            SOURCE,
            "EventWorkerPool.Shutdown",
            true,
            0,
            BTreeMap::from([(
                "workers".to_string(),
                Value::Integer(self.pool.pool_size() as i64),
            )]),
        ));
        true
    }

    pub fn await_workers(&self, timeout: Duration) -> bool {
        self.pool.await_termination(timeout)
    }

    pub fn context(&self) -> &EvaluationContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut EvaluationContext {
        &mut self.context
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.context.set_variable(name, value);
    }

    pub fn pool(&self) -> &EventWorkerPool {
        &self.pool
    }
}

fn check(trigger: &Trigger, context: &mut EvaluationContext) -> bool {
    let result = panic::catch_unwind(AssertUnwindSafe(|| trigger.check(context)))
        .unwrap_or_else(|payload| Err(TriggerError::Check(panic_message(payload.as_ref()))));
    match result {
        Ok(success) => success,
        Err(e) => {
            warn!(kind = %e.kind(), "[{}] Trigger check error in `{}`: {}", SOURCE, trigger, e);
            false
        }
    }
}

fn execution_task(
    trigger: Arc<Trigger>,
    context: &EvaluationContext,
    logger: Arc<dyn EventLogger>,
) -> EventTask {
    let snapshot = context.snapshot();
    EventTask::new(Priority::Medium, move || {
        let result = panic::catch_unwind(AssertUnwindSafe(|| trigger.execute(&snapshot)))
            .unwrap_or_else(|payload| {
                Err(TriggerError::Execution(panic_message(payload.as_ref())))
            });
        result.map_err(|e| {
            logger.record(
                EventLogRecord::new(
                    SOURCE,
                    format!("{} (execution)", trigger.name()),
                    false,
                    0,
                    BTreeMap::from([("error".to_string(), Value::String(e.to_string()))]),
                )
                .with_level(LogLevel::Error),
            );
            PoolError::Action {
                trigger: trigger.name().to_string(),
                source: e,
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ExpressionEngine;
    use crate::event::log::{LogBus, MockEventLogger, NoopLogger};
    use crate::trigger::{Condition, MockTriggerBehavior, TriggerResult};
    use crate::types::Mode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    struct Exploding;

    impl TriggerBehavior for Exploding {
        fn check(&self, _context: &mut EvaluationContext) -> TriggerResult<bool> {
            panic!("check exploded")
        }
    }

    fn dispatcher(logger: Arc<dyn EventLogger>) -> EventDispatcher {
        EventDispatcher::new(EvaluationContext::new(Mode::Strict), 1, logger).unwrap()
    }

    #[test]
    fn test_fires_only_matching_triggers() {
        let engine = Arc::new(ExpressionEngine::default());
        let mut dispatcher = dispatcher(Arc::new(NoopLogger));
        let (tx, rx) = mpsc::channel();

        let fired_tx = tx.clone();
        dispatcher.register(
            Trigger::expression("low", Condition::new(engine.clone(), "hp < 10")).with_action(
                move |snapshot| {
                    fired_tx.send(snapshot.get("hp").cloned()).ok();
                    Ok(())
                },
            ),
        );
        dispatcher.register(
            Trigger::expression("high", Condition::new(engine, "hp > 100")).with_action(
                move |_| {
                    tx.send(None).ok();
                    Ok(())
                },
            ),
        );
        assert_eq!(dispatcher.registered_count(), 2);

        dispatcher.set_variable("hp", 5);
        assert_eq!(dispatcher.poll_and_dispatch(), 1);
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Some(Value::Integer(5))
        );

        dispatcher.shutdown_workers();
        assert!(dispatcher.await_workers(Duration::from_secs(5)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_action_sees_snapshot_not_later_mutation() {
        let engine = Arc::new(ExpressionEngine::default());
        let mut dispatcher = dispatcher(Arc::new(NoopLogger));
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let (tx, rx) = mpsc::channel();

        // Park the only worker so the action runs after the mutation below.
        dispatcher.dispatch(
            move || {
                gate_rx.recv().ok();
                Ok(())
            },
            Priority::High,
        );
        dispatcher.register(
            Trigger::expression("t", Condition::new(engine, "n == 1")).with_action(move |s| {
                tx.send(s.get("n").cloned()).ok();
                Ok(())
            }),
        );
        dispatcher.set_variable("n", 1);
        assert_eq!(dispatcher.poll_and_dispatch(), 1);

        dispatcher.set_variable("n", 2);
        gate_tx.send(()).unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Some(Value::Integer(1))
        );
    }

    #[test]
    fn test_check_failures_are_contained_and_logged() {
        let bus = LogBus::new(64);
        let mut records = bus.subscribe();
        let mut dispatcher = dispatcher(Arc::new(bus));

        let mut failing = MockTriggerBehavior::new();
        failing
            .expect_check()
            .returning(|_| Err(TriggerError::Check("sensor offline".to_string())));

        dispatcher.register(Trigger::custom("failing", failing));
        dispatcher.register(Trigger::custom("panicking", Exploding));
        assert_eq!(dispatcher.poll_and_dispatch(), 0);

        let checks: Vec<_> = records
            .drain()
            .into_iter()
            .filter(|r| r.source == SOURCE)
            .map(|r| (r.trigger, r.success))
            .collect();
        assert_eq!(
            checks,
            vec![
                ("failing".to_string(), false),
                ("panicking".to_string(), false)
            ]
        );
    }

    #[test]
    fn test_execution_failure_is_recorded() {
        let bus = LogBus::new(64);
        let mut records = bus.subscribe();
        let engine = Arc::new(ExpressionEngine::default());
        let mut dispatcher = dispatcher(Arc::new(bus));

        dispatcher.register(
            Trigger::expression("broken", Condition::new(engine, "true"))
                .with_action(|_| Err(TriggerError::Execution("motor jammed".to_string()))),
        );
        assert_eq!(dispatcher.poll_and_dispatch(), 1);
        dispatcher.shutdown_workers();
        assert!(dispatcher.await_workers(Duration::from_secs(5)));

        let failure = records
            .drain()
            .into_iter()
            .find(|r| r.trigger == "broken (execution)")
            .unwrap();
        assert!(!failure.success);
        assert_eq!(failure.level, LogLevel::Error);
        assert_eq!(
            failure.context.get("error"),
            Some(&Value::from("Execution failed: motor jammed"))
        );
    }

    #[test]
    fn test_every_check_is_logged_with_variables() {
        let engine = Arc::new(ExpressionEngine::default());
        let checks = Arc::new(AtomicUsize::new(0));
        let counter = checks.clone();
        let mut logger = MockEventLogger::new();
        logger.expect_record().returning(move |r| {
            if r.source == SOURCE && r.trigger == "idle" {
                assert_eq!(r.context.get("state"), Some(&Value::from("idle")));
                counter.fetch_add(1, Ordering::SeqCst);
            }
            true
        });

        let mut dispatcher = dispatcher(Arc::new(logger));
        dispatcher.set_variable("state", "idle");
        dispatcher.register(Trigger::expression(
            "idle",
            Condition::new(engine, "state === 'idle'"),
        ));
        dispatcher.poll_and_dispatch();
        dispatcher.poll_and_dispatch();
        assert_eq!(checks.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_shutdown_record_and_dropped_submissions() {
        let bus = LogBus::new(64);
        let mut records = bus.subscribe();
        let dispatcher = dispatcher(Arc::new(bus));
        let ran = Arc::new(AtomicUsize::new(0));

        assert!(dispatcher.shutdown_workers());
        assert!(!dispatcher.shutdown_workers());
        let counter = ran.clone();
        assert!(!dispatcher.dispatch(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            Priority::High,
        ));
        assert!(dispatcher.await_workers(Duration::from_secs(5)));
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        let shutdowns: Vec<_> = records
            .drain()
            .into_iter()
            .filter(|r| r.trigger == "EventWorkerPool.Shutdown")
            .collect();
        assert_eq!(shutdowns.len(), 1);
        assert_eq!(shutdowns[0].context.get("workers"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_clear_removes_triggers() {
        let engine = Arc::new(ExpressionEngine::default());
        let mut dispatcher = dispatcher(Arc::new(NoopLogger));
        dispatcher.register(Trigger::expression("a", Condition::new(engine, "true")));
        dispatcher.clear();
        assert_eq!(dispatcher.registered_count(), 0);
        assert_eq!(dispatcher.poll_and_dispatch(), 0);
        assert_eq!(dispatcher.triggers().count(), 0);
    }
}
