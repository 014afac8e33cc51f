use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{self, AtomicBool, AtomicU64};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::{PoolError, PoolResult};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Priority {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl Priority {
    pub fn level(&self) -> u8 {
        *self as u8
    }
}

type TaskAction = Box<dyn FnOnce() -> PoolResult<()> + Send>;

enum Payload {
    Work(Mutex<Option<TaskAction>>),
    Poison,
}

/// Unit of work for the worker pool.
///
/// Tasks order by priority (higher first) and then by sequence id (older
/// first). The poison task sorts after every real task.
pub struct EventTask {
    id: u64,
    priority: Priority,
    created_at: DateTime<Utc>,
    executed: AtomicBool,
    payload: Payload,
}

impl EventTask {
    pub fn new<F>(priority: Priority, action: F) -> Self
    where
        F: FnOnce() -> PoolResult<()> + Send + 'static,
    {
        Self::with_payload(priority, Payload::Work(Mutex::new(Some(Box::new(action)))))
    }

    pub fn poison() -> Self {
        Self::with_payload(Priority::Low, Payload::Poison)
    }

    fn with_payload(priority: Priority, payload: Payload) -> Self {
        Self {
            id: NEXT_TASK_ID.fetch_add(1, atomic::Ordering::Relaxed),
            priority,
            created_at: Utc::now(),
            executed: AtomicBool::new(false),
            payload,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_poison(&self) -> bool {
        matches!(self.payload, Payload::Poison)
    }

    pub fn is_executed(&self) -> bool {
        self.executed.load(atomic::Ordering::Acquire)
    }

    /// Runs the action. Later calls, and calls on the poison task, do
    /// nothing.
    pub fn run(&self) -> PoolResult<()> {
        if self.executed.swap(true, atomic::Ordering::AcqRel) {
            return Ok(());
        }
        let action = match &self.payload {
            Payload::Work(slot) => slot
                .lock()
                .map_err(|e| PoolError::TaskFailed {
                    task: self.id,
                    message: e.to_string(),
                })?
                .take(),
            Payload::Poison => None,
        };
        match action {
            Some(action) => action(),
            None => Ok(()),
        }
    }

    fn band(&self) -> u8 {
        match self.payload {
            Payload::Poison => 0,
            Payload::Work(_) => self.priority.level(),
        }
    }
}

impl fmt::Debug for EventTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTask")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("poison", &self.is_poison())
            .field("executed", &self.is_executed())
            .finish()
    }
}

impl fmt::Display for EventTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_poison() {
            write!(f, "EventTask#{} (poison)", self.id)
        } else {
            write!(f, "EventTask#{} ({})", self.id, self.priority)
        }
    }
}

impl PartialEq for EventTask {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventTask {}

impl PartialOrd for EventTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// BinaryHeap is a max-heap: "greater" pops first.
impl Ord for EventTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.band()
            .cmp(&other.band())
            .then_with(|| other.id.cmp(&self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;
    use std::str::FromStr;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn noop(priority: Priority) -> EventTask {
        EventTask::new(priority, || Ok(()))
    }

    #[test]
    fn test_heap_order() {
        let mut heap = BinaryHeap::new();
        let low = noop(Priority::Low);
        let high_a = noop(Priority::High);
        let poison = EventTask::poison();
        let medium = noop(Priority::Medium);
        let high_b = noop(Priority::High);
        let expected = vec![high_a.id(), high_b.id(), medium.id(), low.id(), poison.id()];

        for task in [low, high_a, poison, medium, high_b] {
            heap.push(task);
        }
        let popped: Vec<_> = std::iter::from_fn(|| heap.pop()).map(|t| t.id()).collect();
        assert_eq!(popped, expected);
    }

    #[test]
    fn test_runs_at_most_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let task = EventTask::new(Priority::Medium, move || {
            counter.fetch_add(1, atomic::Ordering::SeqCst);
            Ok(())
        });
        assert!(!task.is_executed());
        task.run().unwrap();
        task.run().unwrap();
        assert!(task.is_executed());
        assert_eq!(count.load(atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_is_returned_once() {
        let task = EventTask::new(Priority::Low, || {
            Err(PoolError::TaskFailed {
                task: 0,
                message: "boom".to_string(),
            })
        });
        assert!(task.run().is_err());
        assert!(task.run().is_ok());
    }

    #[test]
    fn test_priority_levels() {
        let test_cases = vec![
            ("HIGH", Priority::High, 3),
            ("medium", Priority::Medium, 2),
            ("Low", Priority::Low, 1),
        ];
        for (text, priority, level) in test_cases {
            assert_eq!(Priority::from_str(text), Ok(priority));
            assert_eq!(priority.level(), level);
        }
        assert!(Priority::High > Priority::Low);
        assert!(EventTask::poison().is_poison());
        assert!(noop(Priority::High).to_string().contains("HIGH"));
    }
}
