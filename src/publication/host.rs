//! Hosting providers and the deployable unit they receive

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

const STAGING_DIR: &str = ".staging";
const RETIRED_DIR: &str = ".retired";

/// Errors reported by a hosting provider
#[derive(Debug, Error)]
pub enum HostError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("rejected by host: {0}")]
    Rejected(String),
}

/// An artifact directory packaged for upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployableUnit {
    pub source: PathBuf,

    /// Paths relative to `source`, sorted
    pub files: Vec<PathBuf>,

    pub total_bytes: u64,
}

impl DeployableUnit {
    /// Walk an artifact directory into a unit; an empty site is not deployable
    pub fn from_dir(source: &Path) -> std::io::Result<Self> {
        if !source.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("artifact directory {} does not exist", source.display()),
            ));
        }

        let mut files = Vec::new();
        let mut total_bytes = 0;
        let mut pending = vec![source.to_path_buf()];

        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                let file_type = entry.file_type()?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    total_bytes += entry.metadata()?.len();
                    if let Ok(relative) = path.strip_prefix(source) {
                        files.push(relative.to_path_buf());
                    }
                }
            }
        }

        if files.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("artifact directory {} contains no files", source.display()),
            ));
        }

        files.sort();
        Ok(Self {
            source: source.to_path_buf(),
            files,
            total_bytes,
        })
    }
}

/// A unit sitting in the provider's staging area, not yet live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedUpload {
    pub target: String,
    pub staging_id: String,
    pub location: PathBuf,
}

/// Hosting-provider-specific upload and deployment
#[async_trait]
pub trait HostingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Put the unit into a staging area; the live site is untouched
    async fn upload(&self, unit: &DeployableUnit, target: &str) -> Result<StagedUpload, HostError>;

    /// Make a staged upload live and report its URL
    async fn deploy(&self, staged: &StagedUpload) -> Result<String, HostError>;
}

/// Publishes into `<root>/<target>` on the local filesystem.
///
/// Uploads go to `<root>/.staging`; deployment swaps the staged directory in
/// with renames, so the previous site stays in place until the swap.
#[derive(Debug, Clone)]
pub struct DirectoryHost {
    root: PathBuf,
}

impl DirectoryHost {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn live_dir(&self, target: &str) -> PathBuf {
        self.root.join(target)
    }

    fn copy_unit(unit: &DeployableUnit, dest: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(dest)?;
        for relative in &unit.files {
            let to = dest.join(relative);
            if let Some(parent) = to.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(unit.source.join(relative), &to)?;
        }
        Ok(())
    }

    fn swap_in(staging: &Path, live: &Path, retired: &Path) -> std::io::Result<()> {
        if let Some(parent) = live.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let had_previous = live.exists();
        if had_previous {
            if let Some(parent) = retired.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::rename(live, retired)?;
        }

        if let Err(e) = std::fs::rename(staging, live) {
            if had_previous {
                std::fs::rename(retired, live)?;
            }
            return Err(e);
        }

        if had_previous {
            if let Err(e) = std::fs::remove_dir_all(retired) {
                warn!("Could not remove retired site {}: {}", retired.display(), e);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl HostingProvider for DirectoryHost {
    fn name(&self) -> &str {
        "directory"
    }

    async fn upload(&self, unit: &DeployableUnit, target: &str) -> Result<StagedUpload, HostError> {
        if target.is_empty() || target.contains(['/', '\\']) || target.starts_with('.') {
            return Err(HostError::Rejected(format!("invalid target name '{}'", target)));
        }

        let staging_id = format!("{}-{}", target, Uuid::new_v4());
        let location = self.root.join(STAGING_DIR).join(&staging_id);
        debug!("Staging {} file(s) at {}", unit.files.len(), location.display());

        let unit = unit.clone();
        let dest = location.clone();
        tokio::task::spawn_blocking(move || Self::copy_unit(&unit, &dest))
            .await
            .map_err(|e| HostError::Rejected(format!("upload worker failed: {}", e)))??;

        Ok(StagedUpload {
            target: target.to_string(),
            staging_id,
            location,
        })
    }

    async fn deploy(&self, staged: &StagedUpload) -> Result<String, HostError> {
        let live = self.live_dir(&staged.target);
        let retired = self.root.join(RETIRED_DIR).join(&staged.staging_id);
        let staging = staged.location.clone();
        let live_for_swap = live.clone();

        tokio::task::spawn_blocking(move || Self::swap_in(&staging, &live_for_swap, &retired))
            .await
            .map_err(|e| HostError::Rejected(format!("deploy worker failed: {}", e)))??;

        let absolute = std::fs::canonicalize(&live).unwrap_or(live);
        let url = format!("file://{}", absolute.display());
        info!("Deployed {} to {}", staged.target, url);
        Ok(url)
    }
}
