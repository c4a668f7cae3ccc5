use crate::{
    reference_scenario, validate_scenario, ContentionPolicy, LaunchMode, Result, RetryPolicy,
    Schedule, WorkerTask,
};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Looked up in the working directory when no explicit config file is given.
pub const DEFAULT_CONFIG_NAME: &str = "contend";
pub const ENV_PREFIX: &str = "CONTEND";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Run configuration: defaults, then `contend.toml`, then `CONTEND_*` env vars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path of the shared database file.
    #[serde(default = "default_database")]
    pub database: PathBuf,

    #[serde(default)]
    pub policy: ContentionPolicy,

    /// How long each insert keeps its transaction open before committing.
    #[serde(default)]
    pub hold_ms: u64,

    /// How long a fail-fast writer waits for the lock before reporting busy.
    #[serde(default = "default_busy_grace_ms")]
    pub busy_grace_ms: u64,

    /// Upper bound on waiting for the lock under the serialize policy.
    #[serde(default = "default_serialize_wait_ms")]
    pub serialize_wait_ms: u64,

    #[serde(default)]
    pub schedule: Schedule,

    #[serde(default)]
    pub launch: LaunchMode,

    /// `contend-worker` binary used by the process launch mode.
    #[serde(default)]
    pub worker_bin: Option<PathBuf>,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default = "reference_scenario")]
    pub workers: Vec<WorkerTask>,
}

fn default_database() -> PathBuf {
    PathBuf::from("shared.db")
}

const fn default_busy_grace_ms() -> u64 {
    5_000
}

const fn default_serialize_wait_ms() -> u64 {
    600_000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: default_database(),
            policy: ContentionPolicy::default(),
            hold_ms: 0,
            busy_grace_ms: default_busy_grace_ms(),
            serialize_wait_ms: default_serialize_wait_ms(),
            schedule: Schedule::default(),
            launch: LaunchMode::default(),
            worker_bin: None,
            retry: RetryPolicy::default(),
            log_format: LogFormat::default(),
            workers: reference_scenario(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (required) or from an optional `contend.toml`,
    /// with `CONTEND_*` environment variables layered on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        validate_scenario(&self.workers)
    }

    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }

    pub fn busy_grace(&self) -> Duration {
        Duration::from_millis(self.busy_grace_ms)
    }

    pub fn serialize_wait(&self) -> Duration {
        Duration::from_millis(self.serialize_wait_ms)
    }
}
