//! Dependency resolver strategies
//!
//! Each [`RunnerStrategy`] has one [`DependencyResolver`]. Callers go through
//! [`StrategyResolver::prepare`] and never match on the strategy themselves,
//! so a new strategy only needs a new resolver.

pub mod legacy;
pub mod lockfile;

use crate::{
    core::{EnvironmentSpec, OrchestrationError, RunnerStrategy},
    runner::{CommandInvocation, CommandRunner},
};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use legacy::LegacyPackageManagerSync;
pub use lockfile::LockfileSync;

/// Directory, relative to the project, holding all isolated environments
pub const ENVS_DIR: &str = ".envflow/envs";

/// Where the project lives and where isolated environments are created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    pub project_dir: PathBuf,
    pub envs_dir: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        let project_dir = project_dir.into();
        let envs_dir = project_dir.join(ENVS_DIR);
        Self {
            project_dir,
            envs_dir,
        }
    }

    pub fn with_envs_dir(mut self, envs_dir: impl Into<PathBuf>) -> Self {
        self.envs_dir = envs_dir.into();
        self
    }

    pub fn env_root(&self, env_id: &str) -> PathBuf {
        self.envs_dir.join(env_id)
    }
}

/// A prepared, dependency-synchronized environment owned by one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IsolatedEnvironment {
    pub env_id: String,

    pub strategy: RunnerStrategy,

    /// Environment directory
    pub root: PathBuf,

    /// Directory commands run in
    pub working_dir: PathBuf,

    /// Variables set for every command of this environment
    pub env_vars: BTreeMap<String, String>,
}

impl IsolatedEnvironment {
    /// Build an invocation that runs inside this environment
    pub fn invocation(&self, argv: Vec<String>) -> CommandInvocation {
        CommandInvocation::new(self.env_id.clone(), argv, self.working_dir.clone())
            .with_env(self.env_vars.clone())
    }

    /// Executable directory of a virtualenv rooted at `root`
    pub fn bin_dir(root: &Path) -> PathBuf {
        if cfg!(windows) {
            root.join("Scripts")
        } else {
            root.join("bin")
        }
    }
}

/// Prepares an isolated environment for a spec
#[async_trait]
pub trait DependencyResolver: Send + Sync {
    fn strategy(&self) -> RunnerStrategy;

    /// Describe the environment without touching the filesystem
    fn isolate(&self, spec: &EnvironmentSpec, layout: &WorkspaceLayout) -> IsolatedEnvironment;

    /// Commands that bring the environment in sync with the project
    fn sync_plan(&self, spec: &EnvironmentSpec, env: &IsolatedEnvironment) -> Vec<Vec<String>>;

    /// Create and synchronize the environment.
    ///
    /// Stops at the first failing sync command; nothing of the recipe runs
    /// after a failed preparation.
    async fn prepare(
        &self,
        spec: &EnvironmentSpec,
        layout: &WorkspaceLayout,
        runner: &dyn CommandRunner,
    ) -> Result<IsolatedEnvironment, OrchestrationError> {
        let env = self.isolate(spec, layout);
        let failure = |message: String| OrchestrationError::DependencyResolutionFailure {
            env_id: spec.id.clone(),
            message,
        };

        tokio::fs::create_dir_all(&env.root)
            .await
            .map_err(|e| failure(format!("cannot create {}: {}", env.root.display(), e)))?;

        info!("Preparing {} with {}", spec.id, self.strategy());

        for argv in self.sync_plan(spec, &env) {
            let invocation = env.invocation(argv);
            debug!("Sync step for {}: {}", spec.id, invocation.display());

            let output = runner
                .run(&invocation)
                .await
                .map_err(|e| failure(format!("`{}`: {}", invocation.display(), e)))?;

            if !output.is_success() {
                warn!(
                    "Sync step `{}` failed for {} with exit code {}",
                    invocation.display(),
                    spec.id,
                    output.exit_code
                );
                return Err(failure(format!(
                    "`{}` exited with code {}: {}",
                    invocation.display(),
                    output.exit_code,
                    output.stderr.trim()
                )));
            }
        }

        Ok(env)
    }
}

/// Dispatches preparation to the resolver registered for a spec's strategy
#[derive(Clone)]
pub struct StrategyResolver {
    layout: WorkspaceLayout,
    resolvers: HashMap<RunnerStrategy, Arc<dyn DependencyResolver>>,
}

impl StrategyResolver {
    /// Resolver with both built-in strategies
    pub fn new(layout: WorkspaceLayout) -> Self {
        Self {
            layout,
            resolvers: HashMap::new(),
        }
        .with_resolver(Arc::new(LockfileSync::new()))
        .with_resolver(Arc::new(LegacyPackageManagerSync::new()))
    }

    /// Register or replace the resolver for its strategy
    pub fn with_resolver(mut self, resolver: Arc<dyn DependencyResolver>) -> Self {
        self.resolvers.insert(resolver.strategy(), resolver);
        self
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    pub fn resolver_for(
        &self,
        spec: &EnvironmentSpec,
    ) -> Result<&Arc<dyn DependencyResolver>, OrchestrationError> {
        self.resolvers
            .get(&spec.runner_strategy)
            .ok_or_else(|| OrchestrationError::DependencyResolutionFailure {
                env_id: spec.id.clone(),
                message: format!("no resolver registered for {}", spec.runner_strategy),
            })
    }

    /// The sync commands a spec would run, for dry runs and listings
    pub fn plan(&self, spec: &EnvironmentSpec) -> Result<Vec<Vec<String>>, OrchestrationError> {
        let resolver = self.resolver_for(spec)?;
        let env = resolver.isolate(spec, &self.layout);
        Ok(resolver.sync_plan(spec, &env))
    }

    pub async fn prepare(
        &self,
        spec: &EnvironmentSpec,
        runner: &dyn CommandRunner,
    ) -> Result<IsolatedEnvironment, OrchestrationError> {
        self.resolver_for(spec)?
            .prepare(spec, &self.layout, runner)
            .await
    }
}

/// `PATH` for a child with `bin_dir` in front of the ambient search path
pub(crate) fn path_with(bin_dir: &Path) -> String {
    let mut paths = vec![bin_dir.to_path_buf()];
    if let Some(ambient) = std::env::var_os("PATH") {
        paths.extend(std::env::split_paths(&ambient));
    }
    std::env::join_paths(paths)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| bin_dir.to_string_lossy().into_owned())
}
