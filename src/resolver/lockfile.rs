//! Lockfile-based sync through `uv`

use crate::{
    core::{EnvironmentSpec, RunnerStrategy, LOCKFILE_SYNC_TOOL},
    resolver::{path_with, DependencyResolver, IsolatedEnvironment, WorkspaceLayout},
};
use async_trait::async_trait;

/// Synchronizes the environment straight from the lockfile.
///
/// Deterministic given the lockfile and the spec's `extras`/`with_dev`.
#[derive(Debug, Clone, Default)]
pub struct LockfileSync;

impl LockfileSync {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DependencyResolver for LockfileSync {
    fn strategy(&self) -> RunnerStrategy {
        RunnerStrategy::LockfileSync
    }

    fn isolate(&self, spec: &EnvironmentSpec, layout: &WorkspaceLayout) -> IsolatedEnvironment {
        let root = layout.env_root(&spec.id);
        let root_str = root.to_string_lossy().into_owned();

        let mut env_vars = spec.set_env.clone();
        env_vars.insert("UV_PROJECT_ENVIRONMENT".to_string(), root_str.clone());
        env_vars.insert("VIRTUAL_ENV".to_string(), root_str);
        env_vars.insert(
            "PATH".to_string(),
            path_with(&IsolatedEnvironment::bin_dir(&root)),
        );

        IsolatedEnvironment {
            env_id: spec.id.clone(),
            strategy: self.strategy(),
            root,
            working_dir: layout.project_dir.clone(),
            env_vars,
        }
    }

    fn sync_plan(&self, spec: &EnvironmentSpec, _env: &IsolatedEnvironment) -> Vec<Vec<String>> {
        let mut sync = vec![
            LOCKFILE_SYNC_TOOL.to_string(),
            "sync".to_string(),
            "--locked".to_string(),
        ];
        if let Some(python) = &spec.python {
            sync.push("--python".to_string());
            sync.push(python.clone());
        }
        for extra in &spec.extras {
            sync.push("--extra".to_string());
            sync.push(extra.clone());
        }
        if !spec.with_dev {
            sync.push("--no-dev".to_string());
        }

        let mut plan = vec![sync];
        plan.extend(spec.pre_command_lines());
        plan
    }
}
