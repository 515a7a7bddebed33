//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall workflow run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Run has not started
    Pending,
    /// Run is in progress
    Running,
    /// Every job succeeded
    Completed,
    /// At least one job failed
    Failed,
    /// The trigger gate rejected the event; nothing ran
    Skipped,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "Pending",
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Completed => "Completed",
            ExecutionStatus::Failed => "Failed",
            ExecutionStatus::Skipped => "Skipped",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Running" => ExecutionStatus::Running,
            "Completed" => ExecutionStatus::Completed,
            "Failed" => ExecutionStatus::Failed,
            "Skipped" => ExecutionStatus::Skipped,
            _ => ExecutionStatus::Pending,
        }
    }
}

/// Terminal state of a single environment job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobState {
    Completed {
        commands_run: usize,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    Failed {
        error: String,
        step: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
}

/// State of one workflow run across all of its jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: Uuid,

    pub status: ExecutionStatus,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,

    pub total_jobs: usize,

    pub completed_jobs: usize,

    pub failed_jobs: usize,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            total_jobs: 0,
            completed_jobs: 0,
            failed_jobs: 0,
        }
    }

    /// Mark run as started
    pub fn start(&mut self, total_jobs: usize) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_jobs = total_jobs;
    }

    /// Record a finished job
    pub fn record(&mut self, succeeded: bool) {
        if succeeded {
            self.completed_jobs += 1;
        } else {
            self.failed_jobs += 1;
        }
    }

    /// Close the run; failed if any job failed
    pub fn finish(&mut self) {
        self.status = if self.failed_jobs > 0 {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };
        self.completed_at = Some(Utc::now());
    }

    /// Close the run without doing anything
    pub fn skip(&mut self) {
        let now = Utc::now();
        self.status = ExecutionStatus::Skipped;
        self.started_at.get_or_insert(now);
        self.completed_at = Some(now);
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
