use anyhow::Result;
use serde_json::json;

use crate::banner::Banner;
use crate::cli::Commands;
use contend_core::{RetryPolicy, RunSummary, Settings};
use contend_db::{SharedStore, StoreConfig};
use contend_executor::{Coordinator, ExitStatus, RunReport};

const SUCCESS_HINT: &str = "\
SUCCESS: All workers completed without contention.

Now increase the hold duration (--hold-ms), the time each insert keeps the
store locked before committing, and run again. How well do concurrent
writers share one store when every write takes longer?";

pub async fn execute(command: Commands, mut settings: Settings) -> Result<()> {
    match command {
        Commands::Run {
            policy,
            hold_ms,
            schedule,
            launch,
            max_retries,
            retry_backoff_ms,
            worker_bin,
            json,
        } => {
            if let Some(policy) = policy {
                settings.policy = policy;
            }
            if let Some(hold_ms) = hold_ms {
                settings.hold_ms = hold_ms;
            }
            if let Some(schedule) = schedule {
                settings.schedule = schedule;
            }
            if let Some(launch) = launch {
                settings.launch = launch;
            }
            if worker_bin.is_some() {
                settings.worker_bin = worker_bin;
            }
            settings.retry = RetryPolicy {
                max_retries: max_retries.unwrap_or(settings.retry.max_retries),
                backoff_ms: retry_backoff_ms.unwrap_or(settings.retry.backoff_ms),
            };

            let banner = Banner::collect();
            if !json {
                println!("{}", banner);
                println!("Database:  {}", settings.database.display());
                println!("Policy:    {}", settings.policy);
                println!("Hold:      {} ms", settings.hold_ms);
                println!("Schedule:  {}", settings.schedule);
                println!("Launch:    {}", settings.launch);
                println!();
            }

            let coordinator = Coordinator::from_settings(&settings);
            let report = coordinator.run(settings.workers.clone()).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report_json(&banner, &report))?);
            } else {
                print_report(&report);
                if report.summary.is_clean() && settings.hold_ms == 0 {
                    println!();
                    println!("{}", SUCCESS_HINT);
                }
            }
        }

        Commands::Reset => {
            let store = SharedStore::new(StoreConfig::from_settings(&settings));
            store.reset().await?;
            println!("✓ Store reset: {}", store.path().display());
        }

        Commands::List { json } => {
            let store = SharedStore::new(StoreConfig::from_settings(&settings));
            let records = store.records().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No records in {}", store.path().display());
            } else {
                println!("Records in {} ({}):", store.path().display(), records.len());
                println!("{:<6} {:<20} {}", "ID", "NAME", "CATEGORY");
                for record in records {
                    println!("{:<6} {:<20} {}", record.id, record.name, record.category);
                }
            }
        }

        Commands::Scenario { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&settings.workers)?);
            } else {
                println!("Workers ({}):", settings.workers.len());
                for task in &settings.workers {
                    println!("  {} ({} inserts)", task.label, task.len());
                    for record in &task.records {
                        println!("    - {}", record);
                    }
                }
            }
        }
    }

    Ok(())
}

fn print_report(report: &RunReport) {
    print_summary(&report.summary);

    if !report.interleaving.is_empty() {
        println!();
        println!("Commit order:");
        for (position, (worker, id)) in report.interleaving.iter().enumerate() {
            println!("  {:>2}. {} -> id {}", position + 1, worker, id);
        }
    }

    let abnormal: Vec<_> = report.exits.iter().filter(|e| e.is_abnormal()).collect();
    if !abnormal.is_empty() {
        println!();
        println!("Abnormal workers:");
        for exit in abnormal {
            if let ExitStatus::Abnormal(reason) = &exit.status {
                println!("  ✗ {}: {}", exit.label, reason);
            }
        }
    }

    println!();
    println!("Run ID: {}", report.run_id);
}

fn print_summary(summary: &RunSummary) {
    let marker = if summary.is_clean() { "✓" } else { "⚠" };
    print!("{} {}", marker, summary);
}

fn report_json(banner: &Banner, report: &RunReport) -> serde_json::Value {
    let exits: Vec<_> = report
        .exits
        .iter()
        .map(|exit| match &exit.status {
            ExitStatus::Completed => json!({ "worker": exit.label, "status": "completed" }),
            ExitStatus::Abnormal(reason) => {
                json!({ "worker": exit.label, "status": "abnormal", "reason": reason })
            }
        })
        .collect();

    let interleaving: Vec<_> = report
        .interleaving
        .iter()
        .map(|(worker, id)| json!({ "worker": worker, "id": id }))
        .collect();

    json!({
        "run_id": report.run_id.to_string(),
        "host": banner,
        "summary": report.summary,
        "interleaving": interleaving,
        "exits": exits,
    })
}
