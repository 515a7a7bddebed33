//! Command-line interface

pub mod commands;
pub mod output;

use crate::core::config::DEFAULT_CONFIG_FILE;
use clap::{Parser, Subcommand};
use commands::{GateCommand, HistoryCommand, ListCommand, PublishCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Declarative build/test environment orchestration
#[derive(Debug, Parser, Clone)]
#[command(name = "envflow")]
#[command(version)]
#[command(about = "Run gated build/test environments and publish their artifacts", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run environments for a trigger event
    Run(RunCommand),

    /// List declared environments after matrix expansion
    List(ListCommand),

    /// Validate the configuration
    Validate(ValidateCommand),

    /// Evaluate the trigger gate without running anything
    Gate(GateCommand),

    /// Publish an artifact directory
    Publish(PublishCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }

    /// Project directory: explicit, else the configuration file's directory
    pub fn project_dir(&self, explicit: Option<&PathBuf>) -> PathBuf {
        if let Some(dir) = explicit {
            return dir.clone();
        }
        match self.config.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}
