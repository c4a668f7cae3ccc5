use crate::{Error, NewRecord, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An ordered sequence of inserts owned by one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerTask {
    pub label: String,
    #[serde(default)]
    pub records: Vec<NewRecord>,
}

impl WorkerTask {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            records: Vec::new(),
        }
    }

    pub fn with_record(mut self, name: impl Into<String>, category: impl Into<String>) -> Self {
        self.records.push(NewRecord::new(name, category));
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.label.trim().is_empty() {
            return Err(Error::InvalidTask("worker label must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Three workers with two inserts each.
pub fn reference_scenario() -> Vec<WorkerTask> {
    vec![
        WorkerTask::new("P1")
            .with_record("Ace", "Dog")
            .with_record("Buddy", "Dog"),
        WorkerTask::new("P2")
            .with_record("Cooper", "Rabbit")
            .with_record("Dingo", "Dog"),
        WorkerTask::new("P3")
            .with_record("Emma", "Rabbit")
            .with_record("Felix", "Cat"),
    ]
}

/// Checks that a scenario has at least one worker and that labels are unique.
pub fn validate_scenario(tasks: &[WorkerTask]) -> Result<()> {
    if tasks.is_empty() {
        return Err(Error::InvalidScenario(
            "at least one worker is required".to_string(),
        ));
    }

    let mut labels = HashSet::new();
    for task in tasks {
        task.validate()?;
        if !labels.insert(task.label.as_str()) {
            return Err(Error::InvalidScenario(format!(
                "duplicate worker label: {}",
                task.label
            )));
        }
    }

    Ok(())
}

/// Total number of inserts planned across all workers.
pub fn planned_operations(tasks: &[WorkerTask]) -> usize {
    tasks.iter().map(WorkerTask::len).sum()
}
