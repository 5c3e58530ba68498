//! String matchers for paths, hosts and header values.

use regex::Regex;
use std::sync::Arc;

use crate::config::StringMatch;

/// Type of matcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatcherKind {
    /// Always matches
    Any,
    /// Exact match
    Exact(String),
    /// Prefix match
    Prefix(String),
    /// Suffix match
    Suffix(String),
    /// Regex match against the whole value
    Regex(String),
}

impl MatcherKind {
    /// Create from a StringMatch config.
    ///
    /// Returns `None` when no condition is set. Precedence when several are
    /// set (rejected by config validation): exact, regex, prefix, suffix.
    pub fn from_condition(cond: &StringMatch) -> Option<Self> {
        if let Some(ref exact) = cond.exact {
            Some(MatcherKind::Exact(exact.clone()))
        } else if let Some(ref regex) = cond.regex {
            Some(MatcherKind::Regex(regex.clone()))
        } else if let Some(ref prefix) = cond.prefix {
            if prefix.is_empty() {
                Some(MatcherKind::Any)
            } else {
                Some(MatcherKind::Prefix(prefix.clone()))
            }
        } else {
            cond.suffix.as_ref().map(|suffix| MatcherKind::Suffix(suffix.clone()))
        }
    }
}

/// A compiled matcher for efficient matching.
#[derive(Clone)]
pub struct CompiledMatcher {
    kind: MatcherKind,
    regex: Option<Arc<Regex>>,
}

impl std::fmt::Debug for CompiledMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledMatcher")
            .field("kind", &self.kind)
            .finish()
    }
}

impl CompiledMatcher {
    /// Create a new compiled matcher.
    pub fn new(kind: MatcherKind) -> Result<Self, regex::Error> {
        let regex = match &kind {
            MatcherKind::Regex(pattern) => {
                Some(Arc::new(Regex::new(&format!("^(?:{})$", pattern))?))
            }
            _ => None,
        };

        Ok(Self { kind, regex })
    }

    /// Create from a StringMatch config.
    pub fn from_condition(cond: &StringMatch) -> Result<Option<Self>, regex::Error> {
        match MatcherKind::from_condition(cond) {
            Some(kind) => Ok(Some(Self::new(kind)?)),
            None => Ok(None),
        }
    }

    /// Check if value matches.
    pub fn matches(&self, value: &str) -> bool {
        match &self.kind {
            MatcherKind::Any => true,
            MatcherKind::Exact(exact) => value == exact,
            MatcherKind::Prefix(prefix) => value.starts_with(prefix.as_str()),
            MatcherKind::Suffix(suffix) => value.ends_with(suffix.as_str()),
            MatcherKind::Regex(_) => self.regex.as_ref().map(|r| r.is_match(value)).unwrap_or(false),
        }
    }
}

/// Compile a list of conditions, skipping entries with nothing set.
pub fn compile_all(conds: &[StringMatch]) -> Result<Vec<CompiledMatcher>, regex::Error> {
    let mut matchers = Vec::with_capacity(conds.len());
    for cond in conds {
        if let Some(m) = CompiledMatcher::from_condition(cond)? {
            matchers.push(m);
        }
    }
    Ok(matchers)
}
