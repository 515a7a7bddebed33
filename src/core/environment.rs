//! Environment recipes and concrete environment specs

use crate::core::error::OrchestrationError;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Component, PathBuf};
use std::sync::OnceLock;

/// Program used by the legacy package manager path
pub const LEGACY_PACKAGE_MANAGER: &str = "poetry";

/// Program used by the lockfile-aware sync path
pub const LOCKFILE_SYNC_TOOL: &str = "uv";

/// How dependencies are synchronized before the commands run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunnerStrategy {
    /// Sync straight from the lockfile with `uv sync --locked`
    #[default]
    #[serde(alias = "uv-venv-lock-runner")]
    LockfileSync,
    /// `poetry install --no-root --sync`, then `poetry run <command>`
    #[serde(alias = "poetry")]
    LegacyPackageManagerSync,
}

impl RunnerStrategy {
    /// Prefix placed in front of every recipe command
    pub fn run_prefix(&self) -> &'static [&'static str] {
        match self {
            RunnerStrategy::LockfileSync => &[],
            RunnerStrategy::LegacyPackageManagerSync => &[LEGACY_PACKAGE_MANAGER, "run"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerStrategy::LockfileSync => "lockfile-sync",
            RunnerStrategy::LegacyPackageManagerSync => "legacy-package-manager-sync",
        }
    }
}

impl std::fmt::Display for RunnerStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything an environment needs except its identifier.
///
/// Matrix templates hold one recipe and stamp out one [`EnvironmentSpec`]
/// per parameter value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentRecipe {
    #[serde(default)]
    pub description: Option<String>,

    /// Optional-dependency groups to install
    #[serde(default)]
    pub extras: Vec<String>,

    /// Include development-only dependencies
    #[serde(default)]
    pub with_dev: bool,

    #[serde(default)]
    pub runner_strategy: RunnerStrategy,

    /// Interpreter tag for the isolated environment (e.g. "3.12")
    #[serde(default)]
    pub python: Option<String>,

    /// Run before `command_sequence` as part of environment preparation
    #[serde(default)]
    pub pre_commands: Vec<String>,

    pub command_sequence: Vec<String>,

    /// Extra variables visible to the commands of this environment only
    #[serde(default)]
    pub set_env: BTreeMap<String, String>,

    /// Directory (relative to the project) the commands leave behind
    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,
}

impl EnvironmentRecipe {
    /// Substitute `{{ key }}` placeholders in every templated field
    pub fn render(&self, variables: &HashMap<String, String>) -> EnvironmentRecipe {
        let render_all = |items: &[String]| -> Vec<String> {
            items.iter().map(|item| render_template(item, variables)).collect()
        };

        EnvironmentRecipe {
            description: self
                .description
                .as_ref()
                .map(|d| render_template(d, variables)),
            extras: dedup_preserving_order(render_all(&self.extras)),
            with_dev: self.with_dev,
            runner_strategy: self.runner_strategy,
            python: self.python.as_ref().map(|p| render_template(p, variables)),
            pre_commands: render_all(&self.pre_commands),
            command_sequence: render_all(&self.command_sequence),
            set_env: self
                .set_env
                .iter()
                .map(|(k, v)| (k.clone(), render_template(v, variables)))
                .collect(),
            artifact_dir: self
                .artifact_dir
                .as_ref()
                .map(|p| PathBuf::from(render_template(&p.to_string_lossy(), variables))),
        }
    }

    /// Attach an identifier, producing a concrete spec
    pub fn into_spec(self, id: impl Into<String>) -> EnvironmentSpec {
        EnvironmentSpec {
            id: id.into(),
            description: self.description,
            extras: dedup_preserving_order(self.extras),
            with_dev: self.with_dev,
            runner_strategy: self.runner_strategy,
            python: self.python,
            pre_commands: self.pre_commands,
            command_sequence: self.command_sequence,
            set_env: self.set_env,
            artifact_dir: self.artifact_dir,
        }
    }
}

/// A named, self-contained recipe for preparing dependencies and running commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    /// Unique within a registry
    pub id: String,

    #[serde(default)]
    pub description: Option<String>,

    pub extras: Vec<String>,

    pub with_dev: bool,

    pub runner_strategy: RunnerStrategy,

    #[serde(default)]
    pub python: Option<String>,

    pub pre_commands: Vec<String>,

    /// Never empty once registered
    pub command_sequence: Vec<String>,

    #[serde(default)]
    pub set_env: BTreeMap<String, String>,

    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,
}

impl EnvironmentSpec {
    /// Check the structural invariants of a spec
    pub fn validate(&self) -> Result<(), OrchestrationError> {
        let invalid = |reason: &str| OrchestrationError::InvalidEnvironment {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("identifier must not be empty"));
        }
        if self.id.chars().any(|c| c.is_whitespace() || c == ',') {
            return Err(invalid("identifier must not contain whitespace or commas"));
        }
        // The id names a directory under the environments root
        if self.id == "." || self.id == ".." || self.id.contains(['/', '\\', ':']) {
            return Err(invalid("identifier must not be a path"));
        }
        if self.command_sequence.is_empty() {
            return Err(invalid("command sequence must not be empty"));
        }
        if self
            .command_sequence
            .iter()
            .chain(self.pre_commands.iter())
            .any(|c| split_command_line(c).is_empty())
        {
            return Err(invalid("commands must not be blank"));
        }
        if let Some(dir) = &self.artifact_dir {
            if dir.is_absolute() || dir.components().any(|c| matches!(c, Component::ParentDir)) {
                return Err(invalid("artifact_dir must be relative to the project"));
            }
        }

        Ok(())
    }

    /// Variables available to command templates of this environment
    pub fn template_variables(&self, posargs: &[String]) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("envname".to_string(), self.id.clone());
        vars.insert("posargs".to_string(), join_posargs(posargs));
        if let Some(python) = &self.python {
            vars.insert("python".to_string(), python.clone());
        }
        vars
    }

    /// The argv of every recipe command, with the strategy's run prefix applied
    pub fn command_lines(&self, posargs: &[String]) -> Vec<Vec<String>> {
        let vars = self.template_variables(posargs);
        let prefix = self.runner_strategy.run_prefix();

        self.command_sequence
            .iter()
            .map(|template| {
                let argv = split_command_line(&render_template(template, &vars));
                apply_prefix(prefix, argv)
            })
            .collect()
    }

    /// The argv of every pre-command; these are already package-manager aware
    pub fn pre_command_lines(&self) -> Vec<Vec<String>> {
        let vars = self.template_variables(&[]);
        self.pre_commands
            .iter()
            .map(|template| split_command_line(&render_template(template, &vars)))
            .collect()
    }
}

fn apply_prefix(prefix: &[&str], argv: Vec<String>) -> Vec<String> {
    let already_prefixed = !prefix.is_empty()
        && argv.first().map(String::as_str) == prefix.first().copied();
    if prefix.is_empty() || already_prefixed {
        return argv;
    }
    prefix.iter().map(|p| p.to_string()).chain(argv).collect()
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{ ([A-Za-z0-9_]+) \}\}").expect("valid regex"))
}

/// Replace variables in the form `{{ name }}` in a single pass.
///
/// Substituted values are not scanned again; unknown names stay as written.
pub fn render_template(template: &str, variables: &HashMap<String, String>) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &Captures| match variables.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn join_posargs(posargs: &[String]) -> String {
    posargs
        .iter()
        .map(|arg| {
            if arg.is_empty() || arg.chars().any(char::is_whitespace) {
                format!("\"{}\"", arg.replace('"', "\\\""))
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Split a command line into argv, honouring single and double quotes
pub fn split_command_line(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(ch) = chars.next() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') => match chars.next() {
                Some(next) => current.push(next),
                None => current.push('\\'),
            },
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(ch);
                in_token = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_token {
        args.push(current);
    }

    args
}
