//! CLI command definitions

use crate::core::{EventType, RepositoryIdentity, TriggerEvent, TriggerGate};
use crate::execution::SchedulingStrategy;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

/// Trigger event description, read from the CI environment when present
#[derive(Debug, Args, Clone)]
pub struct TriggerArgs {
    /// Event type (push, manual, pull_request, schedule)
    #[arg(long, env = "GITHUB_EVENT_NAME", default_value = "manual")]
    pub event: EventType,

    /// Branch or ref that triggered the run [default: the gate's branch]
    #[arg(long = "ref", env = "GITHUB_REF")]
    pub branch: Option<String>,

    /// Repository as owner/name [default: the gate's repository]
    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub repo: Option<String>,
}

impl TriggerArgs {
    /// Build the event; a missing ref or repository means a local run in the gated repository
    pub fn to_event(&self, gate: Option<&TriggerGate>) -> Result<TriggerEvent> {
        let branch = match (&self.branch, gate) {
            (Some(branch), _) => branch.clone(),
            (None, Some(gate)) => gate.target_branch.clone(),
            (None, None) => "main".to_string(),
        };

        let repository = match (&self.repo, gate) {
            (Some(repo), _) => repo
                .parse::<RepositoryIdentity>()
                .map_err(anyhow::Error::msg)
                .context("Invalid --repo value")?,
            (None, Some(gate)) => gate.repository.clone(),
            (None, None) => RepositoryIdentity::new("local", "workspace"),
        };

        Ok(TriggerEvent::new(self.event, branch, repository))
    }
}

/// Run environments for a trigger event
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Environments to run, comma separated or repeated; ALL runs every one
    #[arg(short = 'e', long = "env", value_name = "ENV")]
    pub envs: Vec<String>,

    #[command(flatten)]
    pub trigger: TriggerArgs,

    /// Scheduling strategy
    #[arg(long, value_enum, default_value_t = SchedulingStrategyArg::Sequential)]
    pub strategy: SchedulingStrategyArg,

    /// Worker count for parallel-limited
    #[arg(long, default_value_t = 4)]
    pub jobs: usize,

    /// Project directory [default: the configuration file's directory]
    #[arg(long)]
    pub project_dir: Option<PathBuf>,

    /// Per-command timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,

    /// Also save runs the trigger gate rejects to history
    #[arg(long)]
    pub record_skipped: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,

    /// Positional arguments substituted for {{ posargs }}
    #[arg(last = true)]
    pub posargs: Vec<String>,
}

impl RunCommand {
    pub fn scheduling_strategy(&self) -> SchedulingStrategy {
        match self.strategy {
            SchedulingStrategyArg::Sequential => SchedulingStrategy::Sequential,
            SchedulingStrategyArg::Parallel => SchedulingStrategy::Parallel,
            SchedulingStrategyArg::ParallelLimited => SchedulingStrategy::LimitedParallel(self.jobs),
        }
    }

    /// Whether a gate rejection leaves a history record
    pub fn archives_skipped(&self) -> bool {
        self.record_skipped && !self.no_history
    }
}

/// Validate a configuration file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List the environments a configuration declares
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show the dependency sync plan of each environment
    #[arg(long)]
    pub plan: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Check whether a trigger event would be admitted
#[derive(Debug, Args, Clone)]
pub struct GateCommand {
    #[command(flatten)]
    pub trigger: TriggerArgs,
}

/// Publish an artifact directory outside a workflow run
#[derive(Debug, Args, Clone)]
pub struct PublishCommand {
    /// Artifact directory [default: the publication environment's artifact_dir]
    #[arg(long)]
    pub artifact: Option<PathBuf>,

    /// Hosting target name
    #[arg(long)]
    pub target: Option<String>,

    /// Concurrency group key
    #[arg(long)]
    pub group: Option<String>,

    /// Directory the site is published into
    #[arg(long)]
    pub site_root: Option<PathBuf>,

    /// Project directory [default: the configuration file's directory]
    #[arg(long)]
    pub project_dir: Option<PathBuf>,

    /// Don't save the publication to history
    #[arg(long)]
    pub no_history: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Workflow name to filter by
    #[arg(short, long)]
    pub workflow: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show every record of one run
    #[arg(long)]
    pub run_id: Option<String>,
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulingStrategyArg {
    Sequential,
    Parallel,
    #[clap(name = "parallel-limited")]
    ParallelLimited,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn janus_gate() -> TriggerGate {
        TriggerGate::new("main", RepositoryIdentity::new("stfc", "janus-core"))
    }

    #[test]
    fn test_missing_trigger_fields_fall_back_to_gate() {
        let args = TriggerArgs {
            event: EventType::Manual,
            branch: None,
            repo: None,
        };

        let event = args.to_event(Some(&janus_gate())).unwrap();
        assert_eq!(event.branch(), "main");
        assert!(janus_gate().admit(&event));
    }

    #[test]
    fn test_explicit_trigger_fields_win() {
        let args = TriggerArgs {
            event: EventType::Push,
            branch: Some("refs/heads/feature-x".to_string()),
            repo: Some("someone/fork".to_string()),
        };

        let event = args.to_event(Some(&janus_gate())).unwrap();
        assert_eq!(event.branch(), "feature-x");
        assert_eq!(event.repository, RepositoryIdentity::new("someone", "fork"));
        assert!(!janus_gate().admit(&event));
    }

    #[test]
    fn test_bad_repository_is_rejected() {
        let args = TriggerArgs {
            event: EventType::Push,
            branch: None,
            repo: Some("no-slash".to_string()),
        };
        assert!(args.to_event(None).is_err());
    }
}
