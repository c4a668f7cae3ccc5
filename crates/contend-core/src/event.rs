use crate::NewRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Why a single insert did not commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Another writer held the store.
    ResourceBusy,
    /// The store could not be opened for this operation.
    StoreUnavailable,
    /// The store's schema rejected the row.
    ConstraintViolation,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::ResourceBusy => "ResourceBusy",
            FailureKind::StoreUnavailable => "StoreUnavailable",
            FailureKind::ConstraintViolation => "ConstraintViolation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    WorkerStarted {
        planned: usize,
    },
    Attempted {
        attempt: u32,
    },
    Inserted {
        id: i64,
        attempt: u32,
    },
    Failed {
        failure: FailureKind,
        message: String,
        attempt: u32,
        will_retry: bool,
    },
    WorkerFinished {
        succeeded: usize,
        failed: usize,
    },
}

/// One entry in the append-only run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationEvent {
    pub worker: String,
    /// Position of the record in the worker's sequence (0-based).
    pub sequence: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<NewRecord>,
    pub kind: EventKind,
    pub at: DateTime<Utc>,
}

impl OperationEvent {
    pub fn new(worker: impl Into<String>, sequence: usize, record: Option<NewRecord>, kind: EventKind) -> Self {
        Self {
            worker: worker.into(),
            sequence,
            record,
            kind,
            at: Utc::now(),
        }
    }

    pub fn worker_started(worker: &str, planned: usize) -> Self {
        Self::new(worker, 0, None, EventKind::WorkerStarted { planned })
    }

    pub fn worker_finished(worker: &str, succeeded: usize, failed: usize) -> Self {
        Self::new(worker, succeeded + failed, None, EventKind::WorkerFinished { succeeded, failed })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.kind, EventKind::Failed { .. })
    }
}

/// Destination for worker events. Emitting never blocks the worker.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: OperationEvent);
}

pub type EventSender = mpsc::UnboundedSender<OperationEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<OperationEvent>;

impl EventSink for EventSender {
    fn emit(&self, event: OperationEvent) {
        if self.send(event).is_err() {
            tracing::debug!("Event receiver closed, dropping event");
        }
    }
}

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
