use crate::{duration_millis, EventKind, EventReceiver, FailureKind, OperationEvent};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every planned insert committed and nothing failed.
    Clean,
    /// At least one insert failed or a worker ended abnormally.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub workers: usize,
    pub expected: usize,
    pub attempted: usize,
    pub succeeded: usize,
    /// Inserts abandoned because the store stayed busy.
    pub busy: usize,
    pub constraint: usize,
    pub unavailable: usize,
    pub retries: usize,
    /// Every `ResourceBusy` observed, including ones a retry later absorbed.
    pub busy_conditions: usize,
    pub abnormal_workers: usize,
    pub elapsed_ms: u64,
    pub outcome: RunOutcome,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.busy + self.constraint + self.unavailable
    }

    pub fn is_clean(&self) -> bool {
        self.outcome == RunOutcome::Clean
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let outcome = match self.outcome {
            RunOutcome::Clean => "clean",
            RunOutcome::Degraded => "degraded",
        };
        writeln!(f, "Run {} in {:.3}s", outcome, self.elapsed_ms as f64 / 1000.0)?;
        writeln!(f, "  Workers:              {}", self.workers)?;
        writeln!(f, "  Operations planned:   {}", self.expected)?;
        writeln!(f, "  Operations attempted: {}", self.attempted)?;
        writeln!(f, "  Succeeded:            {}", self.succeeded)?;
        writeln!(f, "  Failed (busy):        {}", self.busy)?;
        writeln!(f, "  Failed (constraint):  {}", self.constraint)?;
        writeln!(f, "  Failed (unavailable): {}", self.unavailable)?;
        writeln!(f, "  Busy conditions:      {}", self.busy_conditions)?;
        if self.retries > 0 {
            writeln!(f, "  Busy retries:         {}", self.retries)?;
        }
        if self.abnormal_workers > 0 {
            writeln!(f, "  Abnormal workers:     {}", self.abnormal_workers)?;
        }
        Ok(())
    }
}

/// Passive consumer of the run's event stream.
#[derive(Debug, Default)]
pub struct OutcomeReporter {
    events: Vec<OperationEvent>,
    workers: usize,
    attempted: usize,
    succeeded: usize,
    busy: usize,
    constraint: usize,
    unavailable: usize,
    retries: usize,
    busy_conditions: usize,
}

impl OutcomeReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain `receiver` on its own task until every sender is dropped.
    pub fn spawn(mut receiver: EventReceiver) -> JoinHandle<OutcomeReporter> {
        tokio::spawn(async move {
            let mut reporter = OutcomeReporter::new();
            while let Some(event) = receiver.recv().await {
                reporter.record(event);
            }
            reporter
        })
    }

    pub fn record(&mut self, event: OperationEvent) {
        match &event.kind {
            EventKind::WorkerStarted { planned } => {
                self.workers += 1;
                tracing::debug!(worker = %event.worker, planned, "worker started");
            }
            EventKind::Attempted { attempt } => {
                if *attempt == 1 {
                    self.attempted += 1;
                }
            }
            EventKind::Inserted { id, .. } => {
                self.succeeded += 1;
                tracing::debug!(worker = %event.worker, id, "insert committed");
            }
            EventKind::Failed {
                failure,
                message,
                will_retry,
                ..
            } => {
                if *failure == FailureKind::ResourceBusy {
                    self.busy_conditions += 1;
                }
                if *will_retry {
                    self.retries += 1;
                } else {
                    match failure {
                        FailureKind::ResourceBusy => self.busy += 1,
                        FailureKind::ConstraintViolation => self.constraint += 1,
                        FailureKind::StoreUnavailable => self.unavailable += 1,
                    }
                }
                tracing::debug!(
                    worker = %event.worker,
                    sequence = event.sequence,
                    record = ?event.record,
                    %failure,
                    will_retry,
                    "insert failed: {}",
                    message
                );
            }
            EventKind::WorkerFinished { succeeded, failed } => {
                tracing::debug!(worker = %event.worker, succeeded, failed, "worker finished");
            }
        }

        self.events.push(event);
    }

    pub fn events(&self) -> &[OperationEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<OperationEvent> {
        self.events
    }

    /// Commit order as observed by the reporter: `(worker, id)` per insert.
    pub fn interleaving(&self) -> Vec<(String, i64)> {
        self.events
            .iter()
            .filter_map(|event| match event.kind {
                EventKind::Inserted { id, .. } => Some((event.worker.clone(), id)),
                _ => None,
            })
            .collect()
    }

    pub fn summarize(&self, expected: usize, elapsed: Duration, abnormal_workers: usize) -> RunSummary {
        let failed = self.busy + self.constraint + self.unavailable;
        let outcome = if failed == 0
            && self.busy_conditions == 0
            && abnormal_workers == 0
            && self.succeeded == expected
        {
            RunOutcome::Clean
        } else {
            RunOutcome::Degraded
        };

        RunSummary {
            workers: self.workers,
            expected,
            attempted: self.attempted,
            succeeded: self.succeeded,
            busy: self.busy,
            constraint: self.constraint,
            unavailable: self.unavailable,
            retries: self.retries,
            busy_conditions: self.busy_conditions,
            abnormal_workers,
            elapsed_ms: duration_millis(elapsed),
            outcome,
        }
    }
}
