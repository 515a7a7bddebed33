//! Subprocess runner - starts recipe commands as child processes

use crate::runner::{CommandInvocation, CommandOutput, CommandRunner, RunnerError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Configuration for the subprocess runner
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    /// Per-command timeout in seconds; `None` waits for the process to exit
    pub timeout_secs: Option<u64>,
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }
}

/// Runs commands as child processes, capturing their output.
///
/// Environment variables from the invocation are applied to the child only;
/// the invoking process's environment is never modified.
#[derive(Debug, Clone, Default)]
pub struct SubprocessRunner {
    config: RunnerConfig,
}

impl SubprocessRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    #[cfg(test)]
    pub fn timeout_secs(&self) -> Option<u64> {
        self.config.timeout_secs
    }
}

#[async_trait]
impl CommandRunner for SubprocessRunner {
    async fn run(&self, invocation: &CommandInvocation) -> Result<CommandOutput, RunnerError> {
        let (program, args) = invocation
            .argv
            .split_first()
            .ok_or(RunnerError::EmptyCommand)?;

        debug!(
            "Spawning `{}` for {} in {}",
            invocation.display(),
            invocation.env_id,
            invocation.working_dir.display()
        );

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&invocation.working_dir)
            .envs(&invocation.env)
            .kill_on_drop(true);

        let output = match self.config.timeout_secs {
            Some(secs) => timeout(Duration::from_secs(secs), command.output())
                .await
                .map_err(|_| RunnerError::Timeout(secs))?,
            None => command.output().await,
        }
        .map_err(|e| RunnerError::Spawn {
            program: program.clone(),
            message: e.to_string(),
        })?;

        let exit_code = output.status.code().unwrap_or(-1);
        if !output.status.success() {
            warn!(
                "`{}` exited with code {} in {}",
                invocation.display(),
                exit_code,
                invocation.env_id
            );
        }

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
