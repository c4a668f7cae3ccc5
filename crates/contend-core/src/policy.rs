use crate::Error;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// What a writer experiences when another writer holds the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentionPolicy {
    /// Block until the holder commits or aborts.
    Serialize,
    /// Fail with `ResourceBusy` instead of waiting.
    #[default]
    FailFast,
}

/// How the coordinator starts its workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Schedule {
    /// All workers are launched at once.
    #[default]
    Concurrent,
    /// Each worker is awaited before the next one is launched.
    Sequential,
}

/// Where a worker runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LaunchMode {
    /// An async task in this process with its own store connections.
    #[default]
    Task,
    /// A separate `contend-worker` OS process.
    Process,
}

macro_rules! impl_named {
    ($ty:ty, $kind:literal, { $($variant:path => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($variant => $name,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
                    $($name => Ok($variant),)+
                    other => Err(Error::UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

impl_named!(ContentionPolicy, "contention policy", {
    ContentionPolicy::Serialize => "serialize",
    ContentionPolicy::FailFast => "fail-fast",
});

impl_named!(Schedule, "schedule", {
    Schedule::Concurrent => "concurrent",
    Schedule::Sequential => "sequential",
});

impl_named!(LaunchMode, "launch mode", {
    LaunchMode::Task => "task",
    LaunchMode::Process => "process",
});

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Retry behaviour for `ResourceBusy` failures. The default never retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub backoff_ms: u64,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff_ms: duration_millis(backoff),
        }
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed busy.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }
}
