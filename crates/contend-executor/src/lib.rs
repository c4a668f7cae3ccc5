pub mod coordinator;
pub mod error;
pub mod launcher;
pub mod process;
pub mod worker;

pub use coordinator::{Coordinator, RunReport};
pub use error::{Error, Result};
pub use launcher::{ExitStatus, Launcher, TaskLauncher, WorkerExit};
pub use process::{ProcessLauncher, WORKER_BIN_NAME};
pub use worker::{OperationPlan, Worker, WorkerReport};
