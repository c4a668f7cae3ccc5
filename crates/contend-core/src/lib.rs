pub mod error;
pub mod event;
pub mod policy;
pub mod record;
pub mod report;
pub mod settings;
pub mod task;

// Re-exports
pub use error::{Error, Result};
pub use event::{
    event_channel, EventKind, EventReceiver, EventSender, EventSink, FailureKind, OperationEvent,
};
pub use policy::{duration_millis, ContentionPolicy, LaunchMode, RetryPolicy, Schedule};
pub use record::{NewRecord, Record};
pub use report::{OutcomeReporter, RunOutcome, RunSummary};
pub use settings::{LogFormat, Settings};
pub use task::{planned_operations, reference_scenario, validate_scenario, WorkerTask};
