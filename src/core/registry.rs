//! Environment registry

use crate::core::{config::OrchestrationConfig, environment::EnvironmentSpec, error::OrchestrationError};
use std::collections::HashMap;

/// Selector meaning "every registered environment"
pub const ALL_ENVIRONMENTS: &str = "ALL";

/// Static table of environment specs keyed by identifier.
///
/// Populated at configuration-load time and read-only afterwards, so a
/// finished registry can be shared behind an `Arc` by concurrent jobs.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentRegistry {
    specs: HashMap<String, EnvironmentSpec>,
    /// Registration order
    order: Vec<String>,
}

impl EnvironmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expanded matrices first, then the plain environments
    pub fn from_config(config: &OrchestrationConfig) -> anyhow::Result<Self> {
        config.to_registry()
    }

    /// Register a spec; identifiers must be unique
    pub fn register(&mut self, spec: EnvironmentSpec) -> Result<(), OrchestrationError> {
        if self.specs.contains_key(&spec.id) {
            return Err(OrchestrationError::DuplicateEnvironment(spec.id));
        }
        spec.validate()?;

        self.order.push(spec.id.clone());
        self.specs.insert(spec.id.clone(), spec);
        Ok(())
    }

    /// Look up a spec by identifier
    pub fn resolve(&self, id: &str) -> Result<&EnvironmentSpec, OrchestrationError> {
        self.specs
            .get(id)
            .ok_or_else(|| OrchestrationError::UnknownEnvironment(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.specs.contains_key(id)
    }

    /// Identifiers in registration order
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    /// Specs in registration order
    pub fn iter(&self) -> impl Iterator<Item = &EnvironmentSpec> {
        self.order.iter().filter_map(|id| self.specs.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Resolve a user selection such as `["py311,docs"]`.
    ///
    /// An empty selection or `ALL` selects every environment. Duplicates are
    /// dropped, the first mention wins the position.
    pub fn select<S: AsRef<str>>(
        &self,
        selection: &[S],
    ) -> Result<Vec<&EnvironmentSpec>, OrchestrationError> {
        let names: Vec<&str> = selection
            .iter()
            .flat_map(|s| s.as_ref().split(','))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        if names.is_empty() || names.contains(&ALL_ENVIRONMENTS) {
            return Ok(self.iter().collect());
        }

        let mut seen = std::collections::HashSet::new();
        let mut selected = Vec::new();
        for name in names {
            let spec = self.resolve(name)?;
            if seen.insert(name) {
                selected.push(spec);
            }
        }
        Ok(selected)
    }
}
