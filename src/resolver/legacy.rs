//! Legacy sync through the project's own package manager

use crate::{
    core::{EnvironmentSpec, RunnerStrategy, LEGACY_PACKAGE_MANAGER},
    resolver::{DependencyResolver, IsolatedEnvironment, WorkspaceLayout},
};
use async_trait::async_trait;

/// `poetry install --no-root --sync`, optionally with extra dependency groups.
///
/// Recipe commands are later invoked through `poetry run`, see
/// [`RunnerStrategy::run_prefix`]. Explicit `pre_commands` replace the
/// generated install.
#[derive(Debug, Clone, Default)]
pub struct LegacyPackageManagerSync;

impl LegacyPackageManagerSync {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DependencyResolver for LegacyPackageManagerSync {
    fn strategy(&self) -> RunnerStrategy {
        RunnerStrategy::LegacyPackageManagerSync
    }

    fn isolate(&self, spec: &EnvironmentSpec, layout: &WorkspaceLayout) -> IsolatedEnvironment {
        let root = layout.env_root(&spec.id);

        let mut env_vars = spec.set_env.clone();
        env_vars.insert(
            "POETRY_VIRTUALENVS_PATH".to_string(),
            root.to_string_lossy().into_owned(),
        );
        env_vars.insert("POETRY_VIRTUALENVS_IN_PROJECT".to_string(), "false".to_string());

        IsolatedEnvironment {
            env_id: spec.id.clone(),
            strategy: self.strategy(),
            root,
            working_dir: layout.project_dir.clone(),
            env_vars,
        }
    }

    fn sync_plan(&self, spec: &EnvironmentSpec, _env: &IsolatedEnvironment) -> Vec<Vec<String>> {
        if !spec.pre_commands.is_empty() {
            return spec.pre_command_lines();
        }

        let poetry = LEGACY_PACKAGE_MANAGER.to_string();
        let mut plan = Vec::new();

        if let Some(python) = &spec.python {
            plan.push(vec![poetry.clone(), "env".to_string(), "use".to_string(), python.clone()]);
        }

        let mut install = vec![
            poetry,
            "install".to_string(),
            "--no-root".to_string(),
            "--sync".to_string(),
        ];
        for group in &spec.extras {
            install.push("--with".to_string());
            install.push(group.clone());
        }
        if !spec.with_dev {
            install.push("--without".to_string());
            install.push("dev".to_string());
        }
        plan.push(install);

        plan
    }
}
