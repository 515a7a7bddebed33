//! Job executor - prepares one environment and runs its commands

use crate::{
    core::{EnvironmentSpec, JobState, OrchestrationError, RunnerStrategy},
    execution::ExecutionEvent,
    resolver::StrategyResolver,
    runner::CommandRunner,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Lines of command output kept for logs and failure reports
const OUTPUT_TAIL_LINES: usize = 40;

/// One command that ran as part of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandRecord {
    pub command: String,
    pub exit_code: i32,
}

/// Result of executing one environment job
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub env_id: String,

    pub strategy: RunnerStrategy,

    /// Always terminal
    pub state: JobState,

    /// Present iff the job failed through an orchestration error
    #[serde(skip)]
    pub error: Option<OrchestrationError>,

    /// Recipe commands that ran, in order
    pub commands: Vec<CommandRecord>,

    /// Artifact directory left behind by a successful job
    pub artifact: Option<PathBuf>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.state, JobState::Completed { .. })
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        match &self.state {
            JobState::Completed { started_at, .. } | JobState::Failed { started_at, .. } => *started_at,
        }
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        match &self.state {
            JobState::Completed { completed_at, .. } => *completed_at,
            JobState::Failed { failed_at, .. } => *failed_at,
        }
    }

    /// Outcome for a job whose worker died before reporting
    pub fn aborted(env_id: impl Into<String>, strategy: RunnerStrategy, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            env_id: env_id.into(),
            strategy,
            state: JobState::Failed {
                error: reason.into(),
                step: "worker".to_string(),
                started_at: now,
                failed_at: now,
            },
            error: None,
            commands: Vec::new(),
            artifact: None,
        }
    }
}

/// Executes a single environment job
pub struct JobExecutor<R> {
    runner: R,
    resolver: StrategyResolver,
}

impl<R: CommandRunner> JobExecutor<R> {
    pub fn new(runner: R, resolver: StrategyResolver) -> Self {
        Self { runner, resolver }
    }

    pub fn resolver(&self) -> &StrategyResolver {
        &self.resolver
    }

    /// Prepare the environment, then run every recipe command in order.
    ///
    /// Fails fast: a resolution failure runs no command, a failing command
    /// stops the ones after it.
    pub async fn execute(
        &self,
        spec: &EnvironmentSpec,
        posargs: &[String],
        on_event: &(dyn Fn(ExecutionEvent) + Send + Sync),
    ) -> JobOutcome {
        let started_at = Utc::now();
        let mut commands = Vec::new();

        info!("Executing environment: {}", spec.id);

        let result = self
            .run_to_completion(spec, posargs, on_event, &mut commands)
            .await;

        let finished_at = Utc::now();
        match result {
            Ok(()) => {
                info!("Environment {} completed successfully", spec.id);
                JobOutcome {
                    env_id: spec.id.clone(),
                    strategy: spec.runner_strategy,
                    state: JobState::Completed {
                        commands_run: commands.len(),
                        started_at,
                        completed_at: finished_at,
                    },
                    error: None,
                    commands,
                    artifact: spec
                        .artifact_dir
                        .as_ref()
                        .map(|dir| self.resolver.layout().project_dir.join(dir)),
                }
            }
            Err(err) => {
                error!("Environment {} failed: {}", spec.id, err);
                JobOutcome {
                    env_id: spec.id.clone(),
                    strategy: spec.runner_strategy,
                    state: JobState::Failed {
                        error: err.to_string(),
                        step: err.step_name().to_string(),
                        started_at,
                        failed_at: finished_at,
                    },
                    error: Some(err),
                    commands,
                    artifact: None,
                }
            }
        }
    }

    async fn run_to_completion(
        &self,
        spec: &EnvironmentSpec,
        posargs: &[String],
        on_event: &(dyn Fn(ExecutionEvent) + Send + Sync),
        commands: &mut Vec<CommandRecord>,
    ) -> Result<(), OrchestrationError> {
        let env = self.resolver.prepare(spec, &self.runner).await?;
        on_event(ExecutionEvent::JobPrepared {
            env_id: spec.id.clone(),
            root: env.root.clone(),
        });

        for argv in spec.command_lines(posargs) {
            let invocation = env.invocation(argv);
            let command_line = invocation.display();
            debug!("Running in {}: {}", spec.id, command_line);
            on_event(ExecutionEvent::CommandStarted {
                env_id: spec.id.clone(),
                command: command_line.clone(),
            });

            let (exit_code, output) = match self.runner.run(&invocation).await {
                Ok(output) => (output.exit_code, output.tail(OUTPUT_TAIL_LINES)),
                Err(e) => {
                    error!("Could not run `{}` in {}: {}", command_line, spec.id, e);
                    (-1, e.to_string())
                }
            };

            commands.push(CommandRecord {
                command: command_line.clone(),
                exit_code,
            });

            if exit_code != 0 {
                warn!("`{}` failed in {}:\n{}", command_line, spec.id, output);
                return Err(OrchestrationError::CommandFailure {
                    env_id: spec.id.clone(),
                    command: command_line,
                    exit_code,
                    output,
                });
            }
            if !output.is_empty() {
                debug!("`{}` output in {}:\n{}", command_line, spec.id, output);
            }
        }

        Ok(())
    }
}
