use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use contend_db::SharedStore;
use contend_executor::Worker;
use contend_worker::{JsonLinesSink, WorkerArgs};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; stdout carries events only
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "contend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let args = WorkerArgs::parse();
    let task = args.worker_task()?;

    tracing::info!(
        worker = %task.label,
        db = %args.db.display(),
        policy = %args.policy,
        "Starting contend worker"
    );

    let store = SharedStore::new(args.store_config());
    let report = Worker::new(task, store, args.plan(), JsonLinesSink::stdout())
        .run()
        .await;

    // Failed inserts were reported as events; they don't change the exit code.
    tracing::info!(
        worker = %report.label,
        succeeded = report.succeeded(),
        failed = report.failed,
        "Worker process exiting"
    );

    Ok(())
}
