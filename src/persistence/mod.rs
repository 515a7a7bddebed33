//! Persistence layer for the run archive

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteExecutionStore;

pub use crate::core::ExecutionStatus;
use crate::execution::{PublicationOutcome, RunReport};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// What an archived record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// The workflow run as a whole
    Run,
    Environment,
    Publication,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Run => "run",
            RecordKind::Environment => "environment",
            RecordKind::Publication => "publication",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "run" => Some(RecordKind::Run),
            "environment" => Some(RecordKind::Environment),
            "publication" => Some(RecordKind::Publication),
            _ => None,
        }
    }
}

/// One archived record of a terminal run, job or publication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub record_id: Uuid,

    pub run_id: Uuid,

    pub workflow: String,

    pub kind: RecordKind,

    /// Environment id, publication target, or the trigger for a run record
    pub subject: String,

    pub status: ExecutionStatus,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Failure message, URL or skip reason
    pub detail: Option<String>,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save one record
    async fn save_record(&self, record: &RunSummary) -> Result<()>;

    /// All records of a run, the run record first
    async fn load_run(&self, run_id: Uuid) -> Result<Vec<RunSummary>>;

    /// Run-level records of a workflow, newest first
    async fn list_runs(&self, workflow: &str) -> Result<Vec<RunSummary>>;

    /// Names of every workflow with archived runs
    async fn list_workflows(&self) -> Result<Vec<String>>;

    async fn save_records(&self, records: &[RunSummary]) -> Result<()> {
        for record in records {
            self.save_record(record).await?;
        }
        Ok(())
    }
}

/// In-memory persistence (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryPersistence {
    records: RwLock<HashMap<Uuid, RunSummary>>,
    by_run: RwLock<HashMap<Uuid, Vec<Uuid>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

fn kind_rank(kind: RecordKind) -> u8 {
    match kind {
        RecordKind::Run => 0,
        RecordKind::Environment => 1,
        RecordKind::Publication => 2,
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_record(&self, record: &RunSummary) -> Result<()> {
        let mut records = self.records.write().await;
        let is_new = records.insert(record.record_id, record.clone()).is_none();

        if is_new {
            self.by_run
                .write()
                .await
                .entry(record.run_id)
                .or_default()
                .push(record.record_id);
        }
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Vec<RunSummary>> {
        let records = self.records.read().await;
        let by_run = self.by_run.read().await;

        let mut result: Vec<RunSummary> = by_run
            .get(&run_id)
            .map(|ids| ids.iter().filter_map(|id| records.get(id).cloned()).collect())
            .unwrap_or_default();
        result.sort_by_key(|r| kind_rank(r.kind));
        Ok(result)
    }

    async fn list_runs(&self, workflow: &str) -> Result<Vec<RunSummary>> {
        let records = self.records.read().await;
        let mut runs: Vec<RunSummary> = records
            .values()
            .filter(|r| r.kind == RecordKind::Run && r.workflow == workflow)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let records = self.records.read().await;
        let mut names: Vec<String> = records.values().map(|r| r.workflow.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Archive records for a completed run: the run, each job, the publication
pub fn summaries_from_report(report: &RunReport) -> Vec<RunSummary> {
    let run_id = report.state.run_id;
    let started_at = report.state.started_at.unwrap_or_else(Utc::now);

    let mut records = vec![RunSummary {
        record_id: run_id,
        run_id,
        workflow: report.workflow.clone(),
        kind: RecordKind::Run,
        subject: format!("{} on {}", report.trigger.event_type, report.trigger.branch()),
        status: report.state.status,
        started_at,
        completed_at: report.state.completed_at,
        detail: Some(format!(
            "{} succeeded, {} failed",
            report.state.completed_jobs, report.state.failed_jobs
        )),
    }];

    for job in &report.jobs {
        let detail = match &job.state {
            crate::core::JobState::Failed { error, .. } => Some(error.clone()),
            _ => job.artifact.as_ref().map(|a| a.display().to_string()),
        };
        records.push(RunSummary {
            record_id: Uuid::new_v4(),
            run_id,
            workflow: report.workflow.clone(),
            kind: RecordKind::Environment,
            subject: job.env_id.clone(),
            status: if job.is_success() {
                ExecutionStatus::Completed
            } else {
                ExecutionStatus::Failed
            },
            started_at: job.started_at(),
            completed_at: Some(job.finished_at()),
            detail,
        });
    }

    if let Some(publication) = &report.publication {
        let fallback = report.state.completed_at.unwrap_or(started_at);
        records.push(publication_record(run_id, &report.workflow, publication, fallback));
    }

    records
}

/// Record for one publication; `fallback` dates a publication that failed
pub fn publication_record(
    run_id: Uuid,
    workflow: &str,
    publication: &PublicationOutcome,
    fallback: DateTime<Utc>,
) -> RunSummary {
    let (status, started_at, completed_at, detail) = match &publication.result {
        Some(result) => (
            ExecutionStatus::Completed,
            result.started_at,
            Some(result.finished_at),
            Some(result.url.clone()),
        ),
        None => (
            ExecutionStatus::Failed,
            fallback,
            Some(fallback),
            publication.failure.clone(),
        ),
    };
    RunSummary {
        record_id: Uuid::new_v4(),
        run_id,
        workflow: workflow.to_string(),
        kind: RecordKind::Publication,
        subject: publication.target.clone(),
        status,
        started_at,
        completed_at,
        detail,
    }
}

/// Records for a publication started on its own, outside a workflow run
pub fn summaries_from_publication(
    workflow: &str,
    publication: &PublicationOutcome,
    started_at: DateTime<Utc>,
) -> Vec<RunSummary> {
    let run_id = Uuid::new_v4();
    let finished_at = Utc::now();
    let record = publication_record(run_id, workflow, publication, finished_at);

    vec![
        RunSummary {
            record_id: run_id,
            run_id,
            workflow: workflow.to_string(),
            kind: RecordKind::Run,
            subject: format!("publish to {}", publication.target),
            status: record.status,
            started_at,
            completed_at: Some(finished_at),
            detail: record.detail.clone(),
        },
        record,
    ]
}

/// Archive record for a run the gate turned away
pub fn skipped_summary(workflow: &str, run_id: Uuid, reason: &str) -> RunSummary {
    let now = Utc::now();
    RunSummary {
        record_id: run_id,
        run_id,
        workflow: workflow.to_string(),
        kind: RecordKind::Run,
        subject: "gate".to_string(),
        status: ExecutionStatus::Skipped,
        started_at: now,
        completed_at: Some(now),
        detail: Some(reason.to_string()),
    }
}
