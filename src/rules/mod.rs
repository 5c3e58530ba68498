//! Request path rules.
//!
//! - String matchers (exact, prefix, suffix, regex) shared by trigger rules
//!   and chain selection
//! - Trigger rules that gate whether a request is processed at all

mod matcher;
mod trigger;

pub use matcher::{compile_all, CompiledMatcher, MatcherKind};
pub use trigger::{TriggerRule, TriggerRules};
