//! Command invocation and result types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Error types for running external commands
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn `{program}`: {message}")]
    Spawn { program: String, message: String },

    #[error("timeout after {0} seconds")]
    Timeout(u64),

    #[error("empty command line")]
    EmptyCommand,
}

/// One external process to start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInvocation {
    /// Environment the command belongs to
    pub env_id: String,

    pub argv: Vec<String>,

    pub working_dir: PathBuf,

    /// Variables set for the child only
    pub env: BTreeMap<String, String>,
}

impl CommandInvocation {
    pub fn new(env_id: impl Into<String>, argv: Vec<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            env_id: env_id.into(),
            argv,
            working_dir: working_dir.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    /// Shell-like rendering for logs and error messages
    pub fn display(&self) -> String {
        self.argv
            .iter()
            .map(|arg| {
                if arg.is_empty() || arg.chars().any(char::is_whitespace) {
                    format!("'{}'", arg)
                } else {
                    arg.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What a finished process reported
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// `-1` when the process was killed by a signal
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// The last `max_lines` lines of stdout, then of stderr
    pub fn tail(&self, max_lines: usize) -> String {
        [&self.stdout, &self.stderr]
            .iter()
            .map(|stream| stream.trim_end())
            .filter(|stream| !stream.is_empty())
            .map(|stream| {
                let lines: Vec<&str> = stream.lines().collect();
                lines[lines.len().saturating_sub(max_lines)..].join("\n")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
