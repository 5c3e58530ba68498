//! Trigger rules decide whether a request gets any authservice processing.

use crate::config::TriggerRuleConfig;

use super::matcher::{compile_all, CompiledMatcher};

/// A single compiled trigger rule.
#[derive(Debug, Clone)]
pub struct TriggerRule {
    included: Vec<CompiledMatcher>,
    excluded: Vec<CompiledMatcher>,
}

impl TriggerRule {
    /// Compile a rule from config.
    pub fn new(config: &TriggerRuleConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            included: compile_all(&config.included_paths)?,
            excluded: compile_all(&config.excluded_paths)?,
        })
    }

    /// A rule accepts a path that hits no exclusion and, when inclusions are
    /// configured, hits at least one of them.
    pub fn matches_path(&self, path: &str) -> bool {
        if self.excluded.iter().any(|m| m.matches(path)) {
            return false;
        }
        self.included.is_empty() || self.included.iter().any(|m| m.matches(path))
    }
}

/// Ordered set of trigger rules. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct TriggerRules {
    rules: Vec<TriggerRule>,
}

impl TriggerRules {
    /// Compile all rules from config.
    pub fn new(configs: &[TriggerRuleConfig]) -> Result<Self, regex::Error> {
        let rules = configs
            .iter()
            .map(TriggerRule::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Whether processing applies to `path`.
    ///
    /// No rules configured means every path is processed.
    pub fn matches_path(&self, path: &str) -> bool {
        if self.rules.is_empty() {
            return true;
        }
        self.rules.iter().any(|rule| rule.matches_path(path))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
