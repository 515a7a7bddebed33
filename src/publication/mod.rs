//! Publication pipeline - package, upload and deploy a built artifact

pub mod host;
pub mod queue;

pub use host::{DeployableUnit, DirectoryHost, HostError, HostingProvider, StagedUpload};
pub use queue::{ConcurrencyGroups, GroupSlot};

use crate::core::{OrchestrationError, PublicationStep};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// A request to publish one artifact directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationJob {
    pub job_id: Uuid,
    pub env_id: String,
    pub artifact: PathBuf,
    pub target: String,
    pub concurrency_group: String,
}

impl PublicationJob {
    pub fn new(
        env_id: impl Into<String>,
        artifact: impl Into<PathBuf>,
        target: impl Into<String>,
        concurrency_group: impl Into<String>,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            env_id: env_id.into(),
            artifact: artifact.into(),
            target: target.into(),
            concurrency_group: concurrency_group.into(),
        }
    }

    fn failure(&self, step: PublicationStep, message: impl Into<String>) -> OrchestrationError {
        OrchestrationError::PublicationFailure {
            target: self.target.clone(),
            step,
            message: message.into(),
        }
    }
}

/// A publication that went live
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicationResult {
    pub job_id: Uuid,
    pub target: String,
    pub concurrency_group: String,
    pub url: String,
    pub files: usize,
    pub total_bytes: u64,
    pub queued_at: DateTime<Utc>,
    /// When the job took its concurrency group
    pub started_at: DateTime<Utc>,
    /// When the deploy finished, before the group is released
    pub finished_at: DateTime<Utc>,
}

/// Runs publication jobs through a hosting provider.
///
/// Jobs with the same concurrency group run one at a time in arrival order.
/// A failed job releases its group like a successful one, and the next job
/// proceeds; whatever was last deployed stays live.
pub struct PublicationPipeline {
    host: Arc<dyn HostingProvider>,
    groups: ConcurrencyGroups,
}

impl PublicationPipeline {
    pub fn new(host: Arc<dyn HostingProvider>) -> Self {
        Self {
            host,
            groups: ConcurrencyGroups::new(),
        }
    }

    pub fn groups(&self) -> &ConcurrencyGroups {
        &self.groups
    }

    pub async fn publish(&self, job: &PublicationJob) -> Result<PublicationResult, OrchestrationError> {
        let queued_at = Utc::now();
        info!(
            "Publication of {} to {} ({} host) queued in group '{}'",
            job.env_id,
            job.target,
            self.host.name(),
            job.concurrency_group
        );

        let _slot = self.groups.acquire(&job.concurrency_group).await;
        let started_at = Utc::now();

        let result = self.run_steps(job).await;
        let finished_at = Utc::now();

        match result {
            Ok((unit, url)) => {
                info!("Published {} file(s) to {}", unit.files.len(), url);
                Ok(PublicationResult {
                    job_id: job.job_id,
                    target: job.target.clone(),
                    concurrency_group: job.concurrency_group.clone(),
                    url,
                    files: unit.files.len(),
                    total_bytes: unit.total_bytes,
                    queued_at,
                    started_at,
                    finished_at,
                })
            }
            Err(e) => {
                error!("Publication to {} failed: {}", job.target, e);
                Err(e)
            }
        }
    }

    async fn run_steps(&self, job: &PublicationJob) -> Result<(DeployableUnit, String), OrchestrationError> {
        let artifact = job.artifact.clone();
        let unit = tokio::task::spawn_blocking(move || DeployableUnit::from_dir(&artifact))
            .await
            .map_err(|e| job.failure(PublicationStep::Package, e.to_string()))?
            .map_err(|e| job.failure(PublicationStep::Package, e.to_string()))?;

        let staged = self
            .host
            .upload(&unit, &job.target)
            .await
            .map_err(|e| job.failure(PublicationStep::Upload, e.to_string()))?;

        let url = self
            .host
            .deploy(&staged)
            .await
            .map_err(|e| job.failure(PublicationStep::Deploy, e.to_string()))?;

        Ok((unit, url))
    }
}
