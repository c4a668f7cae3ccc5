use async_trait::async_trait;

use contend_core::{EventSender, LaunchMode, WorkerTask};
use contend_db::SharedStore;

use crate::worker::{OperationPlan, Worker};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    /// The worker ran its whole sequence (individual inserts may have failed).
    Completed,
    /// The worker stopped early or could not be started.
    Abnormal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
    pub label: String,
    pub status: ExitStatus,
}

impl WorkerExit {
    pub fn completed(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            status: ExitStatus::Completed,
        }
    }

    pub fn abnormal(label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            status: ExitStatus::Abnormal(reason.into()),
        }
    }

    pub fn is_abnormal(&self) -> bool {
        matches!(self.status, ExitStatus::Abnormal(_))
    }
}

/// Starts one worker and drives it to completion.
///
/// Implementations must forward every worker event into `events` and must not
/// share mutable state between the workers they run.
#[async_trait]
pub trait Launcher: Send + Sync {
    fn mode(&self) -> LaunchMode;

    async fn run_worker(&self, task: WorkerTask, events: EventSender) -> WorkerExit;
}

/// Runs each worker as an async task in this process, each opening its own
/// store connections.
pub struct TaskLauncher {
    store: SharedStore,
    plan: OperationPlan,
}

impl TaskLauncher {
    pub fn new(store: SharedStore, plan: OperationPlan) -> Self {
        Self { store, plan }
    }
}

#[async_trait]
impl Launcher for TaskLauncher {
    fn mode(&self) -> LaunchMode {
        LaunchMode::Task
    }

    async fn run_worker(&self, task: WorkerTask, events: EventSender) -> WorkerExit {
        let label = task.label.clone();
        Worker::new(task, self.store.clone(), self.plan, events)
            .run()
            .await;
        WorkerExit::completed(label)
    }
}
