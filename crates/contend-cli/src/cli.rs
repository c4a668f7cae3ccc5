use clap::{Parser, Subcommand};
use std::path::PathBuf;

use contend_core::{ContentionPolicy, LaunchMode, Schedule};

#[derive(Parser)]
#[command(name = "contend")]
#[command(about = "Contend - concurrent writers against one shared store", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ./contend.toml when present)
    #[arg(long, global = true, env = "CONTEND_CONFIG")]
    pub config: Option<PathBuf>,

    /// Shared database file
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reset the store and run every configured worker against it
    Run {
        /// Contention policy (serialize, fail-fast)
        #[arg(long)]
        policy: Option<ContentionPolicy>,

        /// How long each insert holds its transaction open, in milliseconds
        #[arg(long)]
        hold_ms: Option<u64>,

        /// Launch schedule (concurrent, sequential)
        #[arg(long)]
        schedule: Option<Schedule>,

        /// Worker isolation (task, process)
        #[arg(long)]
        launch: Option<LaunchMode>,

        /// Busy retries per insert
        #[arg(long)]
        max_retries: Option<u32>,

        /// Pause between busy retries, in milliseconds
        #[arg(long)]
        retry_backoff_ms: Option<u64>,

        /// contend-worker binary for the process launch mode
        #[arg(long)]
        worker_bin: Option<PathBuf>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Drop and recreate the records table
    Reset,

    /// List stored records in insertion order
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the configured worker tasks
    Scenario {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}
