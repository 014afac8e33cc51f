use std::collections::{BTreeMap, BinaryHeap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use super::log::{EventLogRecord, EventLogger};
use super::task::EventTask;
use super::{PoolError, PoolResult};
use crate::trigger::condition::panic_message;
use crate::types::Value;

const SOURCE: &str = "EventWorkerPool";

#[derive(Debug, Default)]
struct Shared {
    queue: Mutex<BinaryHeap<EventTask>>,
    available: Condvar,
    alive: Mutex<usize>,
    terminated: Condvar,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, BinaryHeap<EventTask>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until a task is available.
    fn take(&self) -> EventTask {
        let mut queue = self.queue();
        loop {
            if let Some(task) = queue.pop() {
                return task;
            }
            queue = self
                .available
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

// Decrements the live-worker count even when the worker unwinds.
struct AliveGuard(Arc<Shared>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        let mut alive = self.0.alive.lock().unwrap_or_else(PoisonError::into_inner);
        *alive = alive.saturating_sub(1);
        self.0.terminated.notify_all();
    }
}

/// Fixed set of OS threads draining one shared priority queue.
///
/// Shutdown enqueues one poison task per worker. Poison sorts below every
/// real task, so work queued before shutdown still runs; work submitted
/// after shutdown is dropped.
pub struct EventWorkerPool {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    pool_size: usize,
    running: AtomicBool,
    logger: Arc<dyn EventLogger>,
}

impl EventWorkerPool {
    pub fn new(pool_size: usize, logger: Arc<dyn EventLogger>) -> PoolResult<Self> {
        let pool_size = pool_size.max(1);
        let shared = Arc::new(Shared::default());
        let mut handles = Vec::with_capacity(pool_size);

        for index in 1..=pool_size {
            let name = format!("Worker-{}", index);
            *shared.alive.lock().unwrap_or_else(PoisonError::into_inner) += 1;
            let worker_shared = shared.clone();
            let spawned = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(worker_shared));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    *shared.alive.lock().unwrap_or_else(PoisonError::into_inner) -= 1;
                    let mut queue = shared.queue();
                    for _ in 0..handles.len() {
                        queue.push(EventTask::poison());
                    }
                    shared.available.notify_all();
                    return Err(PoolError::Spawn {
                        name,
                        message: e.to_string(),
                    });
                }
            }
        }

        info!("[{}] Started with {} workers", SOURCE, pool_size);
        logger.record(EventLogRecord::new(
            SOURCE,
            "Startup",
            true,
            0,
            workers_context(pool_size),
        ));

        Ok(Self {
            shared,
            handles: Mutex::new(handles),
            pool_size,
            running: AtomicBool::new(true),
            logger,
        })
    }

    /// Enqueues a task. Returns false, dropping the task, once shutdown has
    /// begun.
    pub fn submit(&self, task: EventTask) -> bool {
        let mut queue = self.shared.queue();
        if !self.running.load(Ordering::Acquire) {
            warn!("[{}] Dropped {} submitted after shutdown", SOURCE, task);
            return false;
        }
        trace!("[{}] Queued {}", SOURCE, task);
        queue.push(task);
        self.shared.available.notify_one();
        true
    }

    /// Stops accepting work and sends one poison task per worker. Only the
    /// first call has an effect.
    pub fn shutdown(&self) -> bool {
        {
            let mut queue = self.shared.queue();
            if self
                .running
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return false;
            }
            for _ in 0..self.pool_size {
                queue.push(EventTask::poison());
            }
            self.shared.available.notify_all();
        }

        info!("[{}] Shutdown requested", SOURCE);
        self.logger.record(EventLogRecord::new(
            SOURCE,
            "Shutdown",
            true,
            0,
            workers_context(self.pool_size),
        ));
        true
    }

    /// Waits up to `timeout` for every worker to exit. Returns whether all
    /// of them did.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let alive = self.shared.alive.lock().unwrap_or_else(PoisonError::into_inner);
        let (alive, _) = self
            .shared
            .terminated
            .wait_timeout_while(alive, timeout, |alive| *alive > 0)
            .unwrap_or_else(PoisonError::into_inner);
        if *alive > 0 {
            warn!("[{}] {} workers still running after {:?}", SOURCE, *alive, timeout);
            return false;
        }
        drop(alive);

        if self.join_workers() {
            info!("[{}] All workers terminated", SOURCE);
            self.logger.record(EventLogRecord::new(
                SOURCE,
                "Termination",
                true,
                0,
                workers_context(self.pool_size),
            ));
        }
        true
    }

    // Returns whether any handle was joined by this call.
    fn join_workers(&self) -> bool {
        let handles: Vec<_> = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        let joined = !handles.is_empty();
        for handle in handles {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!("[{}] {} panicked", SOURCE, name);
            }
        }
        joined
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Real tasks waiting in the queue.
    pub fn queued(&self) -> usize {
        self.shared
            .queue()
            .iter()
            .filter(|task| !task.is_poison())
            .count()
    }

    pub fn alive_workers(&self) -> usize {
        *self.shared.alive.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for EventWorkerPool {
    fn drop(&mut self) {
        self.shutdown();
        self.join_workers();
        debug!("[{}] Dropped", SOURCE);
    }
}

fn worker_loop(shared: Arc<Shared>) {
    let _guard = AliveGuard(shared.clone());
    let name = thread::current().name().unwrap_or("worker").to_string();
    debug!("[{}] Started", name);

    loop {
        let task = shared.take();
        if task.is_poison() {
            break;
        }
        match panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
            Ok(Ok(())) => trace!("[{}] Finished {}", name, task),
            Ok(Err(e)) => error!(kind = %e.kind(), "[{}] Error executing {}: {}", name, task, e),
            Err(payload) => {
                let e = PoolError::TaskPanicked {
                    task: task.id(),
                    message: panic_message(payload.as_ref()),
                };
                error!(kind = %e.kind(), "[{}] {}", name, e);
            }
        }
    }

    debug!("[{}] Worker terminated", name);
}

fn workers_context(pool_size: usize) -> BTreeMap<String, Value> {
    let mut context = BTreeMap::new();
    context.insert("workers".to_string(), Value::Integer(pool_size as i64));
    context
}
