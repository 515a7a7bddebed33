//! Orchestration error taxonomy

use thiserror::Error;

/// Errors raised by the orchestration core.
///
/// Every variant carries enough context (environment id, failing step) to be
/// shown to the user as-is. A rejected trigger is not an error and has no
/// variant here.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestrationError {
    #[error("unknown environment '{0}'")]
    UnknownEnvironment(String),

    #[error("environment '{0}' is already registered")]
    DuplicateEnvironment(String),

    #[error("environment '{id}' is invalid: {reason}")]
    InvalidEnvironment { id: String, reason: String },

    #[error("matrix template '{pattern}' is invalid: {reason}")]
    InvalidMatrix { pattern: String, reason: String },

    #[error("dependency resolution failed for '{env_id}': {message}")]
    DependencyResolutionFailure { env_id: String, message: String },

    #[error(
        "command `{command}` failed in '{env_id}' with exit code {exit_code}{}",
        output_suffix(.output)
    )]
    CommandFailure {
        env_id: String,
        command: String,
        exit_code: i32,
        /// Tail of what the command printed
        output: String,
    },

    #[error("publication to '{target}' failed during {step}: {message}")]
    PublicationFailure {
        target: String,
        step: PublicationStep,
        message: String,
    },
}

impl OrchestrationError {
    /// Environment the error belongs to, if any
    pub fn env_id(&self) -> Option<&str> {
        match self {
            OrchestrationError::UnknownEnvironment(id)
            | OrchestrationError::DuplicateEnvironment(id)
            | OrchestrationError::InvalidEnvironment { id, .. } => Some(id),
            OrchestrationError::DependencyResolutionFailure { env_id, .. }
            | OrchestrationError::CommandFailure { env_id, .. } => Some(env_id),
            OrchestrationError::InvalidMatrix { .. }
            | OrchestrationError::PublicationFailure { .. } => None,
        }
    }

    /// Name of the step that failed, for job-level reporting
    pub fn step_name(&self) -> &'static str {
        match self {
            OrchestrationError::UnknownEnvironment(_)
            | OrchestrationError::DuplicateEnvironment(_)
            | OrchestrationError::InvalidEnvironment { .. }
            | OrchestrationError::InvalidMatrix { .. } => "configure",
            OrchestrationError::DependencyResolutionFailure { .. } => "prepare",
            OrchestrationError::CommandFailure { .. } => "commands",
            OrchestrationError::PublicationFailure { step, .. } => step.as_str(),
        }
    }
}

fn output_suffix(output: &str) -> String {
    if output.is_empty() {
        String::new()
    } else {
        format!("\n{}", output)
    }
}

/// The three scoped steps of a publication
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationStep {
    Package,
    Upload,
    Deploy,
}

impl PublicationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicationStep::Package => "package",
            PublicationStep::Upload => "upload",
            PublicationStep::Deploy => "deploy",
        }
    }
}

impl std::fmt::Display for PublicationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
