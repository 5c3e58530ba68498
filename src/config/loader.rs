use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::rules::{CompiledMatcher, TriggerRules};

use super::types::{BearerConfig, ChainConfig, Config, FilterConfig, StringMatch};

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        debug!(path = %path.display(), "loading configuration");

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(yaml).context("failed to parse YAML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            anyhow::bail!("at least one filter chain must be defined");
        }

        // Each check router needs its own listener
        if self.envoy_listen == Some(self.listen) && self.listen.port() != 0 {
            anyhow::bail!("envoy_listen must differ from listen");
        }

        if self.settings.cleanup_interval.is_zero() {
            anyhow::bail!("settings.cleanup_interval must be greater than zero");
        }

        for (i, rule) in self.trigger_rules.iter().enumerate() {
            for cond in rule.included_paths.iter().chain(&rule.excluded_paths) {
                validate_condition(cond)
                    .with_context(|| format!("invalid path in trigger rule #{}", i))?;
            }
        }
        TriggerRules::new(&self.trigger_rules).context("invalid trigger rule regex")?;

        // Chain names must be unique so requests can be attributed
        let mut chain_names = HashSet::new();
        for chain in &self.chains {
            if !chain_names.insert(&chain.name) {
                anyhow::bail!("duplicate chain name: {}", chain.name);
            }
            validate_chain(chain).with_context(|| format!("invalid chain '{}'", chain.name))?;
        }

        info!(
            chains = self.chains.len(),
            trigger_rules = self.trigger_rules.len(),
            "configuration validated successfully"
        );
        Ok(())
    }
}

fn validate_chain(chain: &ChainConfig) -> Result<()> {
    if chain.name.is_empty() {
        anyhow::bail!("chain name must not be empty");
    }

    if chain.filters.is_empty() {
        anyhow::bail!("at least one filter must be defined");
    }

    if let Some(ref m) = chain.match_ {
        let header_cond = m.header_condition();
        match (&m.header, header_cond.conditions()) {
            (Some(_), 0) => anyhow::bail!("match.header requires one of prefix, equality, suffix or regex"),
            (None, n) if n > 0 => anyhow::bail!("match value conditions require match.header"),
            (Some(_), _) => validate_condition(&header_cond).context("invalid match.header condition")?,
            (None, _) => {}
        }
        if let Some(ref host) = m.host {
            validate_condition(host).context("invalid match.host")?;
        }
        if let Some(ref path) = m.path {
            validate_condition(path).context("invalid match.path")?;
        }
    }

    for filter in &chain.filters {
        match filter {
            FilterConfig::Passthrough => {}
            FilterConfig::Bearer(bearer) => validate_bearer(bearer)?,
            FilterConfig::Session(session) => {
                if session.cookie_name.is_empty() {
                    anyhow::bail!("session filter requires a cookie_name");
                }
                if session.absolute_timeout.is_zero() || session.idle_timeout.is_zero() {
                    anyhow::bail!("session timeouts must be greater than zero");
                }
                validate_bearer(&session.credentials).context("invalid session credentials")?;
            }
        }
    }

    Ok(())
}

fn validate_bearer(bearer: &BearerConfig) -> Result<()> {
    if bearer.header.is_empty() || bearer.scheme.is_empty() {
        anyhow::bail!("bearer filter requires a header and a scheme");
    }
    if bearer.tokens.is_empty() {
        anyhow::bail!("bearer filter requires at least one token");
    }
    if bearer.tokens.iter().any(|t| t.token.is_empty() || t.subject.is_empty()) {
        anyhow::bail!("bearer tokens and subjects must not be empty");
    }
    Ok(())
}

fn validate_condition(cond: &StringMatch) -> Result<()> {
    if cond.conditions() != 1 {
        anyhow::bail!("exactly one of exact, prefix, suffix or regex must be set");
    }
    CompiledMatcher::from_condition(cond)?;
    Ok(())
}
