use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

const DIVIDER_WIDTH: usize = 70;

/// Host details printed before a run.
#[derive(Debug, Clone, Serialize)]
pub struct Banner {
    pub started_at: DateTime<Local>,
    pub os: &'static str,
    pub family: &'static str,
    pub arch: &'static str,
    pub cpus: usize,
    pub executable: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
}

impl Banner {
    pub fn collect() -> Self {
        Self {
            started_at: Local::now(),
            os: std::env::consts::OS,
            family: std::env::consts::FAMILY,
            arch: std::env::consts::ARCH,
            cpus: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            executable: std::env::current_exe().ok(),
            working_dir: std::env::current_dir().ok(),
        }
    }
}

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

impl fmt::Display for Banner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let divider = "=".repeat(DIVIDER_WIDTH);
        writeln!(f, "{}", divider)?;
        writeln!(f, "STARTING UP")?;
        writeln!(
            f,
            "  Date and Time:     {} at {}",
            self.started_at.format("%Y-%m-%d"),
            self.started_at.format("%I:%M %p")
        )?;
        writeln!(f, "  Operating System:  {} {}", self.family, self.os)?;
        writeln!(f, "  Architecture:      {}", self.arch)?;
        writeln!(f, "  CPUs:              {}", self.cpus)?;
        writeln!(f, "  Executable:        {}", display_path(&self.executable))?;
        writeln!(f, "  Working Directory: {}", display_path(&self.working_dir))?;
        write!(f, "{}", divider)
    }
}
