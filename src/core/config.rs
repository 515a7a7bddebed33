//! Orchestration configuration from YAML

use crate::core::{
    environment::{EnvironmentRecipe, RunnerStrategy},
    matrix::MatrixTemplate,
    registry::EnvironmentRegistry,
    trigger::{EventType, RepositoryIdentity, TriggerGate},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "envflow.yaml";

/// Directory-host root used when `site_root` is not configured
pub const DEFAULT_SITE_ROOT: &str = ".envflow/site";

/// Top-level configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Workflow name
    pub name: String,

    /// Recipe fields applied when an environment leaves them out
    #[serde(default)]
    pub defaults: RecipeDefaults,

    /// Parametrized environments, expanded before the plain ones
    #[serde(default)]
    pub matrix: Vec<MatrixConfig>,

    #[serde(default)]
    pub environments: Vec<EnvironmentConfig>,

    /// Workflow-level admission rule; no gate admits everything
    #[serde(default)]
    pub gate: Option<GateConfig>,

    #[serde(default)]
    pub publication: Option<PublicationConfig>,
}

/// Defaults shared by all recipes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipeDefaults {
    #[serde(default)]
    pub runner: Option<RunnerStrategy>,

    #[serde(default)]
    pub extras: Option<Vec<String>>,

    #[serde(default)]
    pub with_dev: Option<bool>,

    #[serde(default)]
    pub set_env: BTreeMap<String, String>,
}

/// Recipe as written in YAML; unset fields fall back to [`RecipeDefaults`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipeConfig {
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub runner: Option<RunnerStrategy>,

    #[serde(default)]
    pub extras: Option<Vec<String>>,

    #[serde(default)]
    pub with_dev: Option<bool>,

    #[serde(default)]
    pub python: Option<String>,

    #[serde(default)]
    pub pre_commands: Vec<String>,

    #[serde(default)]
    pub commands: Vec<String>,

    #[serde(default)]
    pub set_env: BTreeMap<String, String>,

    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,
}

impl RecipeConfig {
    /// Merge with the defaults into a concrete recipe
    pub fn resolve(&self, defaults: &RecipeDefaults) -> EnvironmentRecipe {
        let mut set_env = defaults.set_env.clone();
        set_env.extend(self.set_env.clone());

        EnvironmentRecipe {
            description: self.description.clone(),
            extras: self
                .extras
                .clone()
                .or_else(|| defaults.extras.clone())
                .unwrap_or_default(),
            with_dev: self.with_dev.or(defaults.with_dev).unwrap_or(false),
            runner_strategy: self.runner.or(defaults.runner).unwrap_or_default(),
            python: self.python.clone(),
            pre_commands: self.pre_commands.clone(),
            command_sequence: self.commands.clone(),
            set_env,
            artifact_dir: self.artifact_dir.clone(),
        }
    }
}

/// A single named environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub id: String,

    #[serde(flatten)]
    pub recipe: RecipeConfig,
}

/// A parametrized environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixConfig {
    /// `py{310,311,312}`, or `py{version}` together with `values`
    pub pattern: String,

    #[serde(default)]
    pub values: Option<Vec<Value>>,

    #[serde(default)]
    pub recipe: RecipeConfig,
}

impl MatrixConfig {
    fn values_as_strings(&self) -> Result<Option<Vec<String>>> {
        let Some(values) = &self.values else {
            return Ok(None);
        };

        values
            .iter()
            .map(|value| match value {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                Value::Bool(b) => Ok(b.to_string()),
                other => anyhow::bail!(
                    "Matrix '{}' has a non-scalar value: {:?}",
                    self.pattern,
                    other
                ),
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    pub fn to_template(&self, defaults: &RecipeDefaults) -> Result<MatrixTemplate> {
        let values = self.values_as_strings()?;
        let template = MatrixTemplate::parse(&self.pattern, values, self.recipe.resolve(defaults))?;
        Ok(template)
    }
}

/// Workflow admission rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    pub branch: String,

    /// `owner/name`
    pub repository: String,

    #[serde(default)]
    pub events: Vec<EventType>,
}

impl GateConfig {
    pub fn to_gate(&self) -> Result<TriggerGate> {
        let repository: RepositoryIdentity = self
            .repository
            .parse()
            .map_err(|e: String| anyhow::anyhow!("Invalid gate repository: {}", e))?;
        Ok(TriggerGate::new(self.branch.clone(), repository).with_events(self.events.clone()))
    }
}

/// Where and how the docs artifact is published
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicationConfig {
    /// Environment whose artifact is published
    pub environment: String,

    /// Hosting environment name, e.g. `github-pages`
    pub target: String,

    pub concurrency_group: String,

    /// Job-level restriction on top of the gate; empty allows all
    #[serde(default)]
    pub events: Vec<EventType>,

    /// Root directory for the directory host; defaults under the project
    #[serde(default)]
    pub site_root: Option<PathBuf>,
}

impl PublicationConfig {
    pub fn allows(&self, event: EventType) -> bool {
        self.events.is_empty() || self.events.contains(&event)
    }

    /// Site root, relative paths taken from `project_dir`
    pub fn site_root_in(&self, project_dir: &Path) -> PathBuf {
        match &self.site_root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => project_dir.join(root),
            None => project_dir.join(DEFAULT_SITE_ROOT),
        }
    }
}

impl OrchestrationConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: OrchestrationConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let registry = self.to_registry()?;

        if registry.is_empty() {
            anyhow::bail!("Configuration '{}' declares no environments", self.name);
        }

        if let Some(gate) = &self.gate {
            gate.to_gate()?;
        }

        if let Some(publication) = &self.publication {
            let spec = registry.resolve(&publication.environment).with_context(|| {
                "Publication references an environment that is not declared".to_string()
            })?;
            if spec.artifact_dir.is_none() {
                anyhow::bail!(
                    "Publication environment '{}' does not declare an artifact_dir",
                    spec.id
                );
            }
            if publication.concurrency_group.trim().is_empty() {
                anyhow::bail!("Publication concurrency_group must not be empty");
            }
        }

        Ok(())
    }

    /// Matrix templates in declared order
    pub fn matrix_templates(&self) -> Result<Vec<MatrixTemplate>> {
        self.matrix
            .iter()
            .map(|m| m.to_template(&self.defaults))
            .collect()
    }

    /// Expand every matrix and register every environment
    pub fn to_registry(&self) -> Result<EnvironmentRegistry> {
        let mut registry = EnvironmentRegistry::new();

        for template in self.matrix_templates()? {
            for spec in template.expand() {
                registry.register(spec)?;
            }
        }

        for env in &self.environments {
            registry.register(env.recipe.resolve(&self.defaults).into_spec(env.id.clone()))?;
        }

        Ok(registry)
    }

    pub fn trigger_gate(&self) -> Result<Option<TriggerGate>> {
        self.gate.as_ref().map(GateConfig::to_gate).transpose()
    }
}
