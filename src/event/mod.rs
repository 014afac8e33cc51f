//! # Concurrent Dispatch
//!
//! ```text
//! ┌──────────────┐  check   ┌─────────┐
//! │  Dispatcher  │─────────▶│ Trigger │
//! │ (live ctx)   │◀─────────│         │
//! └──────┬───────┘   bool   └─────────┘
//!        │ snapshot + execute
//!        ▼
//! ┌──────────────┐  take    ┌──────────┐
//! │ PriorityQueue│─────────▶│ Worker-N │
//! └──────────────┘          └──────────┘
//! ```
//!
//! The [`EventDispatcher`] polls its triggers on the calling thread and
//! records every check with the [`EventLogger`]. A trigger that fires has
//! its side effect queued as an [`EventTask`] carrying a frozen
//! [`ContextSnapshot`](crate::eval::ContextSnapshot); workers never see the
//! live context.

pub mod dispatcher;
pub mod log;
pub mod pool;
pub mod task;

pub use dispatcher::EventDispatcher;
pub use log::{EventLogRecord, EventLogger, LogBus, LogLevel, LogReceiver, NoopLogger};
pub use pool::EventWorkerPool;
pub use task::{EventTask, Priority};

use thiserror::Error;

use crate::error::ErrorKind;
use crate::trigger::TriggerError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoolError {
    #[error("Failed to spawn {name}: {message}")]
    Spawn { name: String, message: String },
    #[error("Task {task} failed: {message}")]
    TaskFailed { task: u64, message: String },
    #[error("Task {task} panicked: {message}")]
    TaskPanicked { task: u64, message: String },
    #[error("Action of `{trigger}` failed: {source}")]
    Action {
        trigger: String,
        #[source]
        source: TriggerError,
    },
}

impl PoolError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::DispatchTaskFailed
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
