use std::time::Duration;
use tracing::Instrument;

use contend_core::{
    duration_millis, EventKind, EventSink, NewRecord, OperationEvent, Record, RetryPolicy,
    Settings, WorkerTask,
};
use contend_db::SharedStore;

/// Per-insert parameters shared by every worker of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationPlan {
    pub hold: Duration,
    pub retry: RetryPolicy,
}

impl OperationPlan {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.hold()).with_retry(settings.retry)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub label: String,
    pub inserted: Vec<Record>,
    pub failed: usize,
}

impl WorkerReport {
    pub fn succeeded(&self) -> usize {
        self.inserted.len()
    }
}

/// Runs one task's inserts strictly in order against the shared store.
pub struct Worker<S> {
    task: WorkerTask,
    store: SharedStore,
    plan: OperationPlan,
    sink: S,
}

impl<S: EventSink> Worker<S> {
    pub fn new(task: WorkerTask, store: SharedStore, plan: OperationPlan, sink: S) -> Self {
        Self {
            task,
            store,
            plan,
            sink,
        }
    }

    /// Run the whole sequence. Failed inserts are reported as events and
    /// skipped; this never returns an error.
    pub async fn run(self) -> WorkerReport {
        let span = tracing::info_span!("worker", label = %self.task.label);
        self.run_sequence().instrument(span).await
    }

    async fn run_sequence(self) -> WorkerReport {
        let label = self.task.label.as_str();
        tracing::info!(
            records = self.task.len(),
            hold_ms = duration_millis(self.plan.hold),
            "Worker started"
        );
        self.sink
            .emit(OperationEvent::worker_started(label, self.task.len()));

        let mut report = WorkerReport {
            label: label.to_string(),
            ..WorkerReport::default()
        };

        for (sequence, record) in self.task.records.iter().enumerate() {
            match self.insert_one(sequence, record).await {
                Some(stored) => report.inserted.push(stored),
                None => report.failed += 1,
            }
        }

        self.sink.emit(OperationEvent::worker_finished(
            label,
            report.succeeded(),
            report.failed,
        ));
        tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failed,
            "Worker finished"
        );

        report
    }

    async fn insert_one(&self, sequence: usize, record: &NewRecord) -> Option<Record> {
        let label = self.task.label.as_str();
        let mut attempt = 1;

        loop {
            tracing::info!(sequence, %record, attempt, "Attempting insert");
            self.emit(sequence, record, EventKind::Attempted { attempt });

            match self.store.insert(record, self.plan.hold).await {
                Ok(stored) => {
                    tracing::info!(sequence, %record, id = stored.id, "Inserted");
                    self.emit(
                        sequence,
                        record,
                        EventKind::Inserted {
                            id: stored.id,
                            attempt,
                        },
                    );
                    return Some(stored);
                }
                Err(e) => {
                    let failure = e.failure_kind();
                    let will_retry = e.is_busy() && self.plan.retry.allows_retry(attempt);

                    if will_retry {
                        tracing::warn!(sequence, %record, attempt, %failure, "Insert hit contention, retrying: {}", e);
                    } else {
                        tracing::error!(sequence, %record, attempt, %failure, "ERROR while {} inserting {}: {}", label, record, e);
                    }

                    self.emit(
                        sequence,
                        record,
                        EventKind::Failed {
                            failure,
                            message: e.to_string(),
                            attempt,
                            will_retry,
                        },
                    );

                    if !will_retry {
                        return None;
                    }

                    tokio::time::sleep(self.plan.retry.backoff()).await;
                    attempt += 1;
                }
            }
        }
    }

    fn emit(&self, sequence: usize, record: &NewRecord, kind: EventKind) {
        self.sink.emit(OperationEvent::new(
            self.task.label.clone(),
            sequence,
            Some(record.clone()),
            kind,
        ));
    }
}
