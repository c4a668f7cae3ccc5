use anyhow::{bail, Context};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use contend_core::{EventSender, EventSink, LaunchMode, OperationEvent, WorkerTask};
use contend_db::StoreConfig;

use crate::launcher::{Launcher, WorkerExit};
use crate::worker::OperationPlan;

pub const WORKER_BIN_NAME: &str = "contend-worker";

/// Runs each worker as a separate `contend-worker` process.
///
/// The child prints its events to stdout as JSON lines; they are decoded here
/// and forwarded into the run's event channel. The child's stderr (its log
/// output) is inherited.
pub struct ProcessLauncher {
    program: PathBuf,
    store: StoreConfig,
    plan: OperationPlan,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, store: StoreConfig, plan: OperationPlan) -> Self {
        Self {
            program: program.into(),
            store,
            plan,
        }
    }

    /// `contend-worker` next to the running executable.
    pub fn default_program() -> PathBuf {
        let name = format!("{}{}", WORKER_BIN_NAME, std::env::consts::EXE_SUFFIX);
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(&name)))
            .unwrap_or_else(|| PathBuf::from(name))
    }

    /// Command-line arguments handed to the child for `task`.
    pub fn args_for(&self, task: &WorkerTask) -> anyhow::Result<Vec<String>> {
        let task_json = serde_json::to_string(task).context("failed to encode worker task")?;

        Ok(vec![
            "--db".to_string(),
            self.store.path.display().to_string(),
            "--policy".to_string(),
            self.store.policy.to_string(),
            "--busy-grace-ms".to_string(),
            self.store.busy_grace.as_millis().to_string(),
            "--serialize-wait-ms".to_string(),
            self.store.serialize_wait.as_millis().to_string(),
            "--hold-ms".to_string(),
            self.plan.hold.as_millis().to_string(),
            "--max-retries".to_string(),
            self.plan.retry.max_retries.to_string(),
            "--retry-backoff-ms".to_string(),
            self.plan.retry.backoff_ms.to_string(),
            "--task".to_string(),
            task_json,
        ])
    }

    async fn spawn_and_stream(&self, task: &WorkerTask, events: &EventSender) -> anyhow::Result<()> {
        let mut child = Command::new(&self.program)
            .args(self.args_for(task)?)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program.display()))?;

        tracing::debug!(pid = ?child.id(), "Worker process spawned");

        let stdout = child
            .stdout
            .take()
            .context("worker process stdout was not captured")?;
        let mut lines = BufReader::new(stdout).lines();
        let mut malformed = 0usize;

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<OperationEvent>(&line) {
                Ok(event) => events.emit(event),
                Err(e) => {
                    malformed += 1;
                    tracing::warn!("Unparsable event line from worker process: {} ({})", line, e);
                }
            }
        }

        let status = child.wait().await.context("failed to wait for worker process")?;
        if !status.success() {
            bail!("worker process exited with {}", status);
        }
        if malformed > 0 {
            bail!("worker process emitted {} unparsable event lines", malformed);
        }

        Ok(())
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    fn mode(&self) -> LaunchMode {
        LaunchMode::Process
    }

    async fn run_worker(&self, task: WorkerTask, events: EventSender) -> WorkerExit {
        match self.spawn_and_stream(&task, &events).await {
            Ok(()) => WorkerExit::completed(task.label),
            Err(e) => {
                tracing::error!(worker = %task.label, "Worker process failed: {:#}", e);
                WorkerExit::abnormal(task.label, format!("{:#}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contend_core::{event_channel, ContentionPolicy, RetryPolicy};
    use std::time::Duration;

    fn launcher(program: &str) -> ProcessLauncher {
        ProcessLauncher::new(
            program,
            StoreConfig::new("/tmp/shared.db").with_policy(ContentionPolicy::Serialize),
            OperationPlan::new(Duration::from_secs(3)).with_retry(RetryPolicy::new(1, Duration::from_millis(20))),
        )
    }

    #[test]
    fn test_args_carry_store_and_plan() {
        let task = WorkerTask::new("P1").with_record("Ace", "Dog");
        let args = launcher("contend-worker").args_for(&task).unwrap();

        let value_of = |flag: &str| {
            let pos = args.iter().position(|a| a == flag).unwrap();
            args[pos + 1].clone()
        };

        assert_eq!(value_of("--db"), "/tmp/shared.db");
        assert_eq!(value_of("--policy"), "serialize");
        assert_eq!(value_of("--hold-ms"), "3000");
        assert_eq!(value_of("--max-retries"), "1");
        assert_eq!(value_of("--retry-backoff-ms"), "20");

        let decoded: WorkerTask = serde_json::from_str(&value_of("--task")).unwrap();
        assert_eq!(decoded, task);
    }

    #[test]
    fn test_default_program_name() {
        let program = ProcessLauncher::default_program();
        let name = program.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with(WORKER_BIN_NAME));
    }

    #[tokio::test]
    async fn test_missing_binary_is_abnormal_exit() {
        let (tx, _rx) = event_channel();
        let exit = launcher("/nonexistent/contend-worker")
            .run_worker(WorkerTask::new("P1"), tx)
            .await;

        assert!(exit.is_abnormal());
        assert_eq!(exit.label, "P1");
    }
}
