//! Matrix expansion of parametrized environments

use crate::core::{
    environment::{EnvironmentRecipe, EnvironmentSpec},
    error::OrchestrationError,
};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Parameter name used when a pattern lists its values inline
pub const DEFAULT_PARAMETER: &str = "python";

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([^{}]*)\{([^{}]*)\}([^{}]*)$").expect("valid regex"))
}

/// A parametrized environment identifier, e.g. `py{310,311,312}`.
///
/// Every value stamps out one [`EnvironmentSpec`] sharing the same recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixTemplate {
    prefix: String,
    suffix: String,
    parameter: String,
    values: Vec<String>,
    recipe: EnvironmentRecipe,
}

impl MatrixTemplate {
    pub fn new(
        prefix: impl Into<String>,
        suffix: impl Into<String>,
        parameter: impl Into<String>,
        values: Vec<String>,
        recipe: EnvironmentRecipe,
    ) -> Result<Self, OrchestrationError> {
        let template = Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
            parameter: parameter.into(),
            values,
            recipe,
        };
        template.validate()?;
        Ok(template)
    }

    /// Parse a pattern.
    ///
    /// With no explicit values the braces hold the value list
    /// (`py{310,311,312}`, parameter `python`). With explicit values the
    /// braces name the parameter (`py{version}`).
    pub fn parse(
        pattern: &str,
        explicit_values: Option<Vec<String>>,
        recipe: EnvironmentRecipe,
    ) -> Result<Self, OrchestrationError> {
        let invalid = |reason: &str| OrchestrationError::InvalidMatrix {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let caps = placeholder_regex()
            .captures(pattern)
            .ok_or_else(|| invalid("expected exactly one {...} placeholder"))?;
        let prefix = &caps[1];
        let inner = caps[2].trim();
        let suffix = &caps[3];

        let (parameter, values) = match explicit_values {
            Some(values) => {
                if inner.is_empty() || inner.contains(',') {
                    return Err(invalid("placeholder must name the parameter when values are given"));
                }
                (inner.to_string(), values)
            }
            None => {
                let values = inner
                    .split(',')
                    .map(|v| v.trim().to_string())
                    .collect::<Vec<_>>();
                (DEFAULT_PARAMETER.to_string(), values)
            }
        };

        Self::new(prefix, suffix, parameter, values, recipe)
    }

    fn validate(&self) -> Result<(), OrchestrationError> {
        let invalid = |reason: &str| OrchestrationError::InvalidMatrix {
            pattern: self.pattern(),
            reason: reason.to_string(),
        };

        if self.values.is_empty() {
            return Err(invalid("at least one value is required"));
        }
        if self.values.iter().any(|v| v.is_empty()) {
            return Err(invalid("values must not be empty"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.values.iter().find(|v| !seen.insert(v.as_str())) {
            return Err(invalid(&format!("value '{}' is listed twice", dup)));
        }
        if self.recipe.command_sequence.is_empty() {
            return Err(invalid("recipe command sequence must not be empty"));
        }
        Ok(())
    }

    /// Display form, `prefix{a,b,c}suffix`
    pub fn pattern(&self) -> String {
        format!("{}{{{}}}{}", self.prefix, self.values.join(","), self.suffix)
    }

    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Identifier produced for one value
    pub fn identifier_for(&self, value: &str) -> String {
        format!("{}{}{}", self.prefix, value, self.suffix)
    }

    /// One spec per value, in declared order.
    ///
    /// Pure: expanding the same template twice yields the same sequence.
    pub fn expand(&self) -> Vec<EnvironmentSpec> {
        self.values
            .iter()
            .map(|value| {
                let mut vars = HashMap::new();
                vars.insert(self.parameter.clone(), value.clone());
                vars.insert(format!("{}_dotted", self.parameter), dotted_version(value));
                self.recipe
                    .render(&vars)
                    .into_spec(self.identifier_for(value))
            })
            .collect()
    }
}

/// `310` -> `3.10`; anything that is not a compact version tag is returned as-is
pub fn dotted_version(tag: &str) -> String {
    if tag.len() >= 2 && tag.chars().all(|c| c.is_ascii_digit()) {
        format!("{}.{}", &tag[..1], &tag[1..])
    } else {
        tag.to_string()
    }
}
