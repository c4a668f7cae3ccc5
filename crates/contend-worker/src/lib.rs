use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use contend_core::{ContentionPolicy, EventSink, OperationEvent, RetryPolicy, WorkerTask};
use contend_db::StoreConfig;
use contend_executor::OperationPlan;

#[derive(Parser, Debug)]
#[command(name = "contend-worker")]
#[command(about = "Runs a single contend worker against the shared store", long_about = None)]
#[command(version)]
pub struct WorkerArgs {
    /// Shared database file
    #[arg(long)]
    pub db: PathBuf,

    /// Contention policy (serialize, fail-fast)
    #[arg(long, default_value = "fail-fast")]
    pub policy: ContentionPolicy,

    /// Lock wait for fail-fast before reporting busy, in milliseconds
    #[arg(long, default_value = "5000")]
    pub busy_grace_ms: u64,

    /// Maximum lock wait for serialize, in milliseconds
    #[arg(long, default_value = "600000")]
    pub serialize_wait_ms: u64,

    /// How long each insert holds its transaction open, in milliseconds
    #[arg(long, default_value = "0")]
    pub hold_ms: u64,

    /// Busy retries per insert
    #[arg(long, default_value = "0")]
    pub max_retries: u32,

    /// Pause between busy retries, in milliseconds
    #[arg(long, default_value = "0")]
    pub retry_backoff_ms: u64,

    /// Worker task as JSON: {"label": "...", "records": [{"name": "...", "category": "..."}]}
    #[arg(long)]
    pub task: String,
}

impl WorkerArgs {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(&self.db)
            .with_policy(self.policy)
            .with_busy_grace(Duration::from_millis(self.busy_grace_ms))
            .with_serialize_wait(Duration::from_millis(self.serialize_wait_ms))
    }

    pub fn plan(&self) -> OperationPlan {
        OperationPlan::new(Duration::from_millis(self.hold_ms)).with_retry(RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_backoff_ms),
        ))
    }

    pub fn worker_task(&self) -> Result<WorkerTask> {
        let task: WorkerTask =
            serde_json::from_str(&self.task).context("--task is not a valid worker task")?;
        task.validate()?;
        Ok(task)
    }
}

/// Writes each event as one JSON line. The parent process reads these from
/// the child's stdout, so nothing else may be written there.
pub struct JsonLinesSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn emit(&self, event: OperationEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to encode event: {}", e);
                return;
            }
        };

        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            tracing::error!("Failed to write event: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contend_core::EventKind;

    fn parse(extra: &[&str]) -> WorkerArgs {
        let mut argv = vec![
            "contend-worker",
            "--db",
            "/tmp/shared.db",
            "--task",
            r#"{"label":"P1","records":[{"name":"Ace","category":"Dog"}]}"#,
        ];
        argv.extend_from_slice(extra);
        WorkerArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        let config = args.store_config();

        assert_eq!(config.policy, ContentionPolicy::FailFast);
        assert_eq!(config.busy_grace, Duration::from_secs(5));
        assert_eq!(args.plan(), OperationPlan::default());

        let task = args.worker_task().unwrap();
        assert_eq!(task.label, "P1");
        assert_eq!(task.len(), 1);
    }

    #[test]
    fn test_flags_reach_config_and_plan() {
        let args = parse(&[
            "--policy",
            "serialize",
            "--hold-ms",
            "250",
            "--max-retries",
            "2",
            "--retry-backoff-ms",
            "10",
        ]);

        assert_eq!(args.store_config().policy, ContentionPolicy::Serialize);
        let plan = args.plan();
        assert_eq!(plan.hold, Duration::from_millis(250));
        assert_eq!(plan.retry, RetryPolicy::new(2, Duration::from_millis(10)));
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let result = WorkerArgs::try_parse_from([
            "contend-worker",
            "--db",
            "x.db",
            "--policy",
            "optimistic",
            "--task",
            "{}",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_blank_label_rejected() {
        let mut args = parse(&[]);
        args.task = r#"{"label":"  "}"#.to_string();
        assert!(args.worker_task().is_err());

        args.task = "not json".to_string();
        assert!(args.worker_task().is_err());
    }

    #[test]
    fn test_sink_writes_one_line_per_event() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.emit(OperationEvent::worker_started("P1", 2));
        sink.emit(OperationEvent::worker_finished("P1", 2, 0));

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let events: Vec<OperationEvent> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].kind, EventKind::WorkerStarted { planned: 2 }));
        assert_eq!(events[1].worker, "P1");
    }
}
