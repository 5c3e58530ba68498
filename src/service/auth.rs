use anyhow::{Context, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, info, instrument, trace, warn, Instrument, Span};

use crate::check::{CheckOutcome, CheckRequest, CheckResponse, Code, Decision};
use crate::config::Config;
use crate::filter::{ConfiguredChain, FilterChain};
use crate::http::PathQueryFragment;
use crate::rules::TriggerRules;
use crate::telemetry::counters;

/// Result of one cleanup sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Chains whose hook ran to completion
    pub completed: usize,
    /// Chains whose hook panicked
    pub failed: Vec<String>,
}

/// Dispatches checks to the first matching filter chain.
///
/// Shared by every in-flight check; holds no per-request state.
pub struct AuthService {
    trigger_rules: TriggerRules,
    chains: Vec<Arc<dyn FilterChain>>,
}

impl AuthService {
    /// Build the dispatcher from configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let trigger_rules =
            TriggerRules::new(&config.trigger_rules).context("invalid trigger rule")?;

        let mut chains: Vec<Arc<dyn FilterChain>> = Vec::with_capacity(config.chains.len());
        for chain_config in &config.chains {
            let chain = ConfiguredChain::new(chain_config)?;
            chains.push(Arc::new(chain));
        }

        info!(
            trigger_rules = trigger_rules.len(),
            chains = chains.len(),
            "auth service configured"
        );

        Ok(Self::from_parts(trigger_rules, chains))
    }

    /// Build the dispatcher from already constructed parts.
    pub fn from_parts(trigger_rules: TriggerRules, chains: Vec<Arc<dyn FilterChain>>) -> Self {
        Self {
            trigger_rules,
            chains,
        }
    }

    pub fn chain_names(&self) -> Vec<&str> {
        self.chains.iter().map(|c| c.name()).collect()
    }

    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    /// Decide one check.
    ///
    /// Never fails: a panic while selecting a chain and every failure of the
    /// selected chain become [`Decision::Internal`]. Dropping the returned future aborts
    /// the pipeline.
    #[instrument(
        name = "check",
        skip_all,
        fields(
            request_id = %request.http().id,
            host = %request.http().host,
            path = %request.http().path,
        )
    )]
    pub async fn check(&self, request: CheckRequest) -> CheckOutcome {
        let path = match PathQueryFragment::parse(&request.http().path) {
            Ok(target) => target.path().to_string(),
            Err(e) => {
                warn!(error = %e, "unable to extract path from request");
                counters::check_decided("", Decision::Internal.name());
                return CheckOutcome::internal(None);
            }
        };

        if !self.trigger_rules.matches_path(&path) {
            debug!(path = %path, "no matching trigger rule, request allowed without processing");
            counters::trigger_rule_bypass();
            return CheckOutcome::allow();
        }

        let selected = catch_unwind(AssertUnwindSafe(|| {
            self.chains.iter().find(|c| c.matches(&request)).cloned()
        }));
        let chain = match selected {
            Ok(Some(chain)) => chain,
            Ok(None) => {
                debug!("no matching filter chain, request allowed without processing");
                counters::no_chain_match();
                return CheckOutcome::allow();
            }
            Err(_) => {
                error!("filter chain panicked while matching request");
                counters::pipeline_panic("");
                counters::check_decided("", Decision::Internal.name());
                return CheckOutcome::internal(None);
            }
        };

        let name = chain.name().to_string();
        debug!(chain = %name, "processing request with filter chain");

        let start = Instant::now();
        let task = AbortOnDropHandle::new(tokio::spawn(
            async move {
                let mut processor = chain.new_processor();
                let mut response = CheckResponse::new();
                let code = processor.process(&request, &mut response).await;
                (code, response)
            }
            .instrument(Span::current()),
        ));

        let outcome = match task.await {
            Ok((code, response)) => {
                let decision = Decision::from_code(code);
                trace!(chain = %name, code = %code, "pipeline finished");
                if code != Code::Ok && decision == Decision::Allow {
                    debug!(chain = %name, code = %code, "request denied by filter chain");
                }
                CheckOutcome {
                    decision,
                    response,
                    chain: Some(name.clone()),
                }
            }
            Err(e) if e.is_panic() => {
                error!(chain = %name, "filter chain panicked while processing request");
                counters::pipeline_panic(&name);
                CheckOutcome::internal(Some(name.clone()))
            }
            Err(e) => {
                error!(chain = %name, error = %e, "filter chain task did not complete");
                CheckOutcome::internal(Some(name.clone()))
            }
        };

        counters::check_duration(&name, start.elapsed().as_secs_f64());
        counters::check_decided(&name, outcome.decision.name());
        debug!(chain = %name, decision = %outcome.decision, "check complete");

        outcome
    }

    /// Run every chain's cleanup hook once, in configuration order.
    ///
    /// Hooks run on the blocking pool. A hook that panics is logged and the
    /// sweep continues with the next chain.
    pub async fn run_periodic_cleanup(&self) -> CleanupReport {
        let mut report = CleanupReport::default();

        for chain in &self.chains {
            let name = chain.name().to_string();
            let chain = Arc::clone(chain);

            match tokio::task::spawn_blocking(move || chain.do_periodic_cleanup()).await {
                Ok(()) => {
                    counters::cleanup_run(&name, "ok");
                    report.completed += 1;
                }
                Err(e) => {
                    error!(chain = %name, error = %e, "filter chain cleanup failed");
                    counters::cleanup_run(&name, "panic");
                    report.failed.push(name);
                }
            }
        }

        trace!(
            completed = report.completed,
            failed = report.failed.len(),
            "periodic cleanup finished"
        );

        report
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("trigger_rules", &self.trigger_rules.len())
            .field("chains", &self.chain_names())
            .finish()
    }
}
