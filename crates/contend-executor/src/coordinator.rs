use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use contend_core::{
    event_channel, planned_operations, validate_scenario, EventSender, LaunchMode,
    OperationEvent, OutcomeReporter, RunOutcome, RunSummary, Schedule, Settings, WorkerTask,
};
use contend_db::{SharedStore, StoreConfig};

use crate::launcher::{Launcher, TaskLauncher, WorkerExit};
use crate::process::ProcessLauncher;
use crate::worker::OperationPlan;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub summary: RunSummary,
    pub events: Vec<OperationEvent>,
    /// Commit order as `(worker, id)` pairs.
    pub interleaving: Vec<(String, i64)>,
    pub exits: Vec<WorkerExit>,
}

/// Resets the store, launches every worker and waits for all of them.
pub struct Coordinator {
    store: SharedStore,
    launcher: Arc<dyn Launcher>,
    schedule: Schedule,
}

impl Coordinator {
    pub fn new(store: SharedStore, launcher: Arc<dyn Launcher>, schedule: Schedule) -> Self {
        Self {
            store,
            launcher,
            schedule,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let store_config = StoreConfig::from_settings(settings);
        let plan = OperationPlan::from_settings(settings);

        let launcher: Arc<dyn Launcher> = match settings.launch {
            LaunchMode::Task => Arc::new(TaskLauncher::new(
                SharedStore::new(store_config.clone()),
                plan,
            )),
            LaunchMode::Process => {
                let program = settings
                    .worker_bin
                    .clone()
                    .unwrap_or_else(ProcessLauncher::default_program);
                Arc::new(ProcessLauncher::new(program, store_config.clone(), plan))
            }
        };

        Self::new(SharedStore::new(store_config), launcher, settings.schedule)
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    pub async fn run(&self, tasks: Vec<WorkerTask>) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id);
        self.run_inner(run_id, tasks).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, tasks: Vec<WorkerTask>) -> Result<RunReport> {
        validate_scenario(&tasks)?;
        let expected = planned_operations(&tasks);

        tracing::info!(
            workers = tasks.len(),
            expected,
            policy = %self.store.policy(),
            schedule = %self.schedule,
            mode = %self.launcher.mode(),
            "Starting run"
        );

        // Nothing is launched until the reset has completed.
        if let Err(e) = self.store.reset().await {
            tracing::error!("Shared store could not be reset, no workers launched: {}", e);
            return Err(Error::Store(e));
        }

        let (events, receiver) = event_channel();
        let reporter = OutcomeReporter::spawn(receiver);
        let started = Instant::now();

        let exits = match self.schedule {
            Schedule::Concurrent => {
                let handles: Vec<_> = tasks
                    .into_iter()
                    .map(|task| self.spawn_worker(task, events.clone()))
                    .collect();

                let mut exits = Vec::with_capacity(handles.len());
                for (label, handle) in handles {
                    exits.push(join_worker(label, handle).await);
                }
                exits
            }
            Schedule::Sequential => {
                let mut exits = Vec::with_capacity(tasks.len());
                for task in tasks {
                    let (label, handle) = self.spawn_worker(task, events.clone());
                    exits.push(join_worker(label, handle).await);
                }
                exits
            }
        };

        // The reporter finishes once the last sender is gone.
        drop(events);
        let reporter = reporter
            .await
            .map_err(|e| Error::Reporter(e.to_string()))?;

        let elapsed = started.elapsed();
        let abnormal = exits.iter().filter(|exit| exit.is_abnormal()).count();
        let summary = reporter.summarize(expected, elapsed, abnormal);

        match summary.outcome {
            RunOutcome::Clean => tracing::info!(
                succeeded = summary.succeeded,
                elapsed_ms = summary.elapsed_ms,
                "Run completed clean"
            ),
            RunOutcome::Degraded => tracing::warn!(
                succeeded = summary.succeeded,
                busy = summary.busy,
                busy_conditions = summary.busy_conditions,
                constraint = summary.constraint,
                unavailable = summary.unavailable,
                abnormal_workers = summary.abnormal_workers,
                elapsed_ms = summary.elapsed_ms,
                "Run completed degraded"
            ),
        }

        let interleaving = reporter.interleaving();
        Ok(RunReport {
            run_id,
            summary,
            events: reporter.into_events(),
            interleaving,
            exits,
        })
    }

    fn spawn_worker(&self, task: WorkerTask, events: EventSender) -> (String, JoinHandle<WorkerExit>) {
        let launcher = self.launcher.clone();
        let label = task.label.clone();

        tracing::info!(worker = %label, records = task.len(), "Launching worker");
        let handle = tokio::spawn(
            async move { launcher.run_worker(task, events).await }.in_current_span(),
        );

        (label, handle)
    }
}

async fn join_worker(label: String, handle: JoinHandle<WorkerExit>) -> WorkerExit {
    match handle.await {
        Ok(exit) => {
            if exit.is_abnormal() {
                tracing::error!(worker = %label, status = ?exit.status, "Worker ended abnormally");
            }
            exit
        }
        Err(e) => {
            tracing::error!(worker = %label, "Worker task failed: {}", e);
            WorkerExit::abnormal(label, e.to_string())
        }
    }
}
