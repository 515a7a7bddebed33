//! Running external commands (test runners, doc generators, package managers)

pub mod invocation;
pub mod subprocess;

use async_trait::async_trait;
use std::sync::Arc;

pub use invocation::{CommandInvocation, CommandOutput, RunnerError};
pub use subprocess::{RunnerConfig, SubprocessRunner};

/// Trait for command execution - allows for different implementations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run one command to completion and report its exit status
    async fn run(&self, invocation: &CommandInvocation) -> Result<CommandOutput, RunnerError>;
}

#[async_trait]
impl<T: CommandRunner + ?Sized> CommandRunner for Arc<T> {
    async fn run(&self, invocation: &CommandInvocation) -> Result<CommandOutput, RunnerError> {
        (**self).run(invocation).await
    }
}
