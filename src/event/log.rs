//! # Audit Log
//!
//! The dispatcher and the worker pool report through an [`EventLogger`].
//! Recording never blocks: [`LogBus`] publishes on a bounded broadcast ring
//! where the oldest records are overwritten for receivers that fall behind.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{Display, EnumString};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::types::Value;

static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventLogRecord {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub trigger: String,
    pub success: bool,
    pub elapsed_nanos: u64,
    pub level: LogLevel,
    pub context: BTreeMap<String, Value>,
}

impl EventLogRecord {
    pub fn new(
        source: impl Into<String>,
        trigger: impl Into<String>,
        success: bool,
        elapsed_nanos: u64,
        context: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            seq: NEXT_SEQ.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
            source: source.into(),
            trigger: trigger.into(),
            success,
            elapsed_nanos,
            level: LogLevel::default(),
            context,
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }
}

/// Sink for audit records. Returns whether the record was accepted.
#[mockall::automock]
pub trait EventLogger: Send + Sync {
    fn record(&self, record: EventLogRecord) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl EventLogger for NoopLogger {
    fn record(&self, record: EventLogRecord) -> bool {
        trace!("dropped log record #{} ({})", record.seq, record.trigger);
        false
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LogBusError {
    #[error("Log record send failed: {message}")]
    SendFailed { message: String },
    #[error("Log record receive failed: {message}")]
    ReceiveFailed { message: String },
    #[error("Log receiver lagged: {count}")]
    Lagged { count: u64 },
}

pub type LogBusResult<T> = Result<T, LogBusError>;

#[derive(Debug, Clone)]
pub struct LogBus {
    sender: broadcast::Sender<EventLogRecord>,
    capacity: usize,
}

impl LogBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    pub fn subscribe(&self) -> LogReceiver {
        LogReceiver::new(self.sender.subscribe())
    }

    pub fn publish(&self, record: EventLogRecord) -> LogBusResult<usize> {
        self.sender
            .send(record)
            .map_err(|e| LogBusError::SendFailed {
                message: e.to_string(),
            })
    }

    pub fn queue_size(&self) -> usize {
        self.sender.len()
    }

    pub fn subscribers_size(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl EventLogger for LogBus {
    fn record(&self, record: EventLogRecord) -> bool {
        match self.publish(record) {
            Ok(receivers) => {
                trace!("log record delivered to {} receivers", receivers);
                true
            }
            // No subscriber is listening.
            Err(_) => false,
        }
    }
}

pub struct LogReceiver {
    receiver: broadcast::Receiver<EventLogRecord>,
}

impl LogReceiver {
    fn new(receiver: broadcast::Receiver<EventLogRecord>) -> Self {
        Self { receiver }
    }

    /// 受信する。Laggedの場合は最新位置へ追いつき、エラーを返す。
    pub async fn recv(&mut self) -> LogBusResult<EventLogRecord> {
        match self.receiver.recv().await {
            Ok(record) => Ok(record),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                debug!("log receiver skipped {} records", n);
                Err(LogBusError::Lagged { count: n })
            }
            Err(e) => Err(LogBusError::ReceiveFailed {
                message: e.to_string(),
            }),
        }
    }

    /// Non-blocking receive for synchronous consumers. `Ok(None)` when the
    /// ring is currently empty.
    pub fn try_recv(&mut self) -> LogBusResult<Option<EventLogRecord>> {
        match self.receiver.try_recv() {
            Ok(record) => Ok(Some(record)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                debug!("log receiver skipped {} records", n);
                Err(LogBusError::Lagged { count: n })
            }
            Err(e) => Err(LogBusError::ReceiveFailed {
                message: e.to_string(),
            }),
        }
    }

    /// Everything currently buffered, skipping over lag gaps.
    pub fn drain(&mut self) -> Vec<EventLogRecord> {
        let mut records = Vec::new();
        loop {
            match self.try_recv() {
                Ok(Some(record)) => records.push(record),
                Err(LogBusError::Lagged { .. }) => continue,
                Ok(None) | Err(_) => break,
            }
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(trigger: &str) -> EventLogRecord {
        EventLogRecord::new("test", trigger, true, 10, BTreeMap::new())
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let a = record("a");
        let b = record("b");
        assert!(b.seq > a.seq);
        assert_eq!(a.level, LogLevel::Info);
        assert_eq!(record("c").with_level(LogLevel::Error).level, LogLevel::Error);
        assert!(LogLevel::Trace < LogLevel::Error);
    }

    #[test]
    fn test_record_serializes() {
        let mut context = BTreeMap::new();
        context.insert("workers".to_string(), Value::Integer(2));
        let json = serde_json::to_value(EventLogRecord::new("pool", "Startup", true, 0, context))
            .unwrap();
        assert_eq!(json["level"], "INFO");
        assert_eq!(json["context"]["workers"], 2);
        assert_eq!(json["trigger"], "Startup");
    }

    #[test]
    fn test_without_subscribers_records_are_dropped() {
        let bus = LogBus::new(4);
        assert!(!bus.record(record("a")));
        assert!(!NoopLogger.record(record("a")));
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = LogBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscribers_size(), 2);

        assert!(bus.record(record("fired")));

        assert_eq!(rx1.recv().await.unwrap().trigger, "fired");
        assert_eq!(rx2.recv().await.unwrap().trigger, "fired");
    }

    #[tokio::test]
    async fn test_lagging_receiver_loses_oldest() {
        let bus = LogBus::new(2);
        let mut rx = bus.subscribe();
        for name in ["a", "b", "c", "d"] {
            bus.record(record(name));
        }

        assert_eq!(rx.recv().await, Err(LogBusError::Lagged { count: 2 }));
        assert_eq!(rx.recv().await.unwrap().trigger, "c");
        assert_eq!(rx.recv().await.unwrap().trigger, "d");
    }

    #[test]
    fn test_drain_skips_lag() {
        let bus = LogBus::new(2);
        let mut rx = bus.subscribe();
        for name in ["a", "b", "c"] {
            bus.record(record(name));
        }
        let names: Vec<_> = rx.drain().into_iter().map(|r| r.trigger).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(rx.try_recv(), Ok(None));
    }
}
