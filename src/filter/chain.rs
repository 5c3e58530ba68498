//! Filter chains.

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::check::CheckRequest;
use crate::config::{ChainConfig, ChainMatch, FilterConfig, StringMatch};
use crate::http::{strip_port, PathQueryFragment};
use crate::rules::CompiledMatcher;
use crate::session::{InMemorySessionStore, SessionStore};

use super::bearer::{BearerFilter, BearerValidator};
use super::passthrough::PassthroughFilter;
use super::pipeline::Pipeline;
use super::session::{SessionFilter, SessionPolicy};
use super::Filter;

/// A named group of filters selected by a request predicate.
///
/// One instance per configured chain, shared by every request for the life
/// of the process. All methods may be called concurrently.
pub trait FilterChain: Send + Sync {
    /// Chain name (unique within a configuration).
    fn name(&self) -> &str;

    /// Whether this chain handles the request.
    fn matches(&self, request: &CheckRequest) -> bool;

    /// Create a fresh processor for exactly one request.
    fn new_processor(&self) -> Box<dyn Filter>;

    /// Reclaim expired chain-scoped state.
    fn do_periodic_cleanup(&self);
}

/// Errors building a chain from configuration.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain '{chain}': invalid regex: {source}")]
    InvalidRegex {
        chain: String,
        #[source]
        source: regex::Error,
    },

    #[error("chain '{0}' has no filters")]
    NoFilters(String),
}

/// Request selection predicate of a chain.
///
/// Every configured criterion must hold. No criteria matches everything.
#[derive(Debug, Clone, Default)]
pub struct ChainMatcher {
    header: Option<HeaderCriterion>,
    host: Option<CompiledMatcher>,
    path: Option<CompiledMatcher>,
}

#[derive(Debug, Clone)]
struct HeaderCriterion {
    name: String,
    value: Option<CompiledMatcher>,
}

impl ChainMatcher {
    pub fn new(criteria: Option<&ChainMatch>) -> Result<Self, regex::Error> {
        let Some(criteria) = criteria else {
            return Ok(Self::default());
        };

        let header = match &criteria.header {
            Some(name) => Some(HeaderCriterion {
                name: name.to_ascii_lowercase(),
                value: CompiledMatcher::from_condition(&criteria.header_condition())?,
            }),
            None => None,
        };

        Ok(Self {
            header,
            host: compile_optional(criteria.host.as_ref())?,
            path: compile_optional(criteria.path.as_ref())?,
        })
    }

    pub fn matches(&self, request: &CheckRequest) -> bool {
        if let Some(ref header) = self.header {
            let Some(value) = request.header(&header.name) else {
                return false;
            };
            if let Some(ref matcher) = header.value {
                if !matcher.matches(value) {
                    return false;
                }
            }
        }

        if let Some(ref matcher) = self.host {
            let http = request.http();
            let host = if http.host.is_empty() {
                request.header("host").unwrap_or_default()
            } else {
                http.host.as_str()
            };
            if !matcher.matches(strip_port(host)) {
                return false;
            }
        }

        if let Some(ref matcher) = self.path {
            match PathQueryFragment::parse(&request.http().path) {
                Ok(target) if matcher.matches(target.path()) => {}
                _ => return false,
            }
        }

        true
    }
}

fn compile_optional(cond: Option<&StringMatch>) -> Result<Option<CompiledMatcher>, regex::Error> {
    match cond {
        Some(cond) => CompiledMatcher::from_condition(cond),
        None => Ok(None),
    }
}

enum FilterSpec {
    Passthrough,
    Bearer(Arc<BearerValidator>),
    Session {
        policy: Arc<SessionPolicy>,
        store: Arc<InMemorySessionStore>,
    },
}

impl FilterSpec {
    fn build(&self) -> Box<dyn Filter> {
        match self {
            FilterSpec::Passthrough => Box::new(PassthroughFilter),
            FilterSpec::Bearer(validator) => Box::new(BearerFilter::new(validator.clone())),
            FilterSpec::Session { policy, store } => {
                Box::new(SessionFilter::new(policy.clone(), store.clone()))
            }
        }
    }
}

/// A chain built from configuration.
pub struct ConfiguredChain {
    name: String,
    matcher: ChainMatcher,
    filters: Vec<FilterSpec>,
    session_stores: Vec<Arc<InMemorySessionStore>>,
}

impl ConfiguredChain {
    pub fn new(config: &ChainConfig) -> Result<Self, ChainError> {
        if config.filters.is_empty() {
            return Err(ChainError::NoFilters(config.name.clone()));
        }

        let matcher =
            ChainMatcher::new(config.match_.as_ref()).map_err(|source| ChainError::InvalidRegex {
                chain: config.name.clone(),
                source,
            })?;

        let mut filters = Vec::with_capacity(config.filters.len());
        let mut session_stores = Vec::new();

        for filter in &config.filters {
            let spec = match filter {
                FilterConfig::Passthrough => FilterSpec::Passthrough,
                FilterConfig::Bearer(bearer) => {
                    FilterSpec::Bearer(Arc::new(BearerValidator::new(bearer)))
                }
                FilterConfig::Session(session) => {
                    let store = Arc::new(InMemorySessionStore::new(
                        session.absolute_timeout,
                        session.idle_timeout,
                    ));
                    session_stores.push(store.clone());
                    FilterSpec::Session {
                        policy: Arc::new(SessionPolicy {
                            cookie_name: session.cookie_name.clone(),
                            max_age: session.absolute_timeout,
                            validator: BearerValidator::new(&session.credentials),
                        }),
                        store,
                    }
                }
            };
            filters.push(spec);
        }

        debug!(
            chain = %config.name,
            filters = ?config.filters.iter().map(FilterConfig::type_name).collect::<Vec<_>>(),
            session_stores = session_stores.len(),
            "chain built"
        );

        Ok(Self {
            name: config.name.clone(),
            matcher,
            filters,
            session_stores,
        })
    }

    /// Number of live and expired sessions across the chain's stores.
    pub fn session_count(&self) -> usize {
        self.session_stores.iter().map(|s| s.len()).sum()
    }
}

impl FilterChain for ConfiguredChain {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, request: &CheckRequest) -> bool {
        self.matcher.matches(request)
    }

    fn new_processor(&self) -> Box<dyn Filter> {
        Box::new(Pipeline::new(self.filters.iter().map(FilterSpec::build).collect()))
    }

    fn do_periodic_cleanup(&self) {
        for store in &self.session_stores {
            let removed = store.remove_all_expired();
            debug!(chain = %self.name, removed, remaining = store.len(), "expired sessions removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{CheckResponse, Code};
    use crate::config::{BearerConfig, SessionConfig, TokenConfig};
    use std::time::Duration;

    fn chain_match(yaml: &str) -> ChainMatch {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn request(path: &str) -> CheckRequest {
        CheckRequest::new("GET", "https", "api.example.com:8443", path)
    }

    #[test]
    fn test_no_criteria_matches_everything() {
        let matcher = ChainMatcher::new(None).unwrap();
        assert!(matcher.matches(&request("/")));
        assert!(matcher.matches(&CheckRequest::default()));

        let empty = ChainMatcher::new(Some(&ChainMatch::default())).unwrap();
        assert!(empty.matches(&request("/anything")));
    }

    #[test]
    fn test_header_prefix() {
        let matcher =
            ChainMatcher::new(Some(&chain_match("header: \":path\"\nprefix: /secure\n"))).unwrap();
        assert!(matcher.matches(&request("/secure/data")));
        assert!(!matcher.matches(&request("/public")));
    }

    #[test]
    fn test_header_equality_alias() {
        let matcher =
            ChainMatcher::new(Some(&chain_match("header: x-tenant\nequality: acme\n"))).unwrap();
        assert!(matcher.matches(&request("/").with_header("X-Tenant", "acme")));
        assert!(!matcher.matches(&request("/").with_header("x-tenant", "other")));
        assert!(!matcher.matches(&request("/")));
    }

    #[test]
    fn test_host_ignores_port() {
        let matcher =
            ChainMatcher::new(Some(&chain_match("host:\n  exact: api.example.com\n"))).unwrap();
        assert!(matcher.matches(&request("/")));

        let other = CheckRequest::new("GET", "https", "www.example.com", "/");
        assert!(!matcher.matches(&other));
    }

    #[test]
    fn test_path_ignores_query() {
        let matcher =
            ChainMatcher::new(Some(&chain_match("path:\n  regex: \"/api/v[0-9]+\"\n"))).unwrap();
        assert!(matcher.matches(&request("/api/v2?debug=1")));
        assert!(!matcher.matches(&request("/api/v2/users")));
        assert!(!matcher.matches(&request("not-a-path")));
    }

    #[test]
    fn test_all_criteria_must_hold() {
        let criteria = chain_match(
            "header: x-tenant\nexact: acme\nhost:\n  suffix: example.com\npath:\n  prefix: /api\n",
        );
        let matcher = ChainMatcher::new(Some(&criteria)).unwrap();

        let req = request("/api/x").with_header("x-tenant", "acme");
        assert!(matcher.matches(&req));
        assert!(!matcher.matches(&request("/api/x")));
        assert!(!matcher.matches(&request("/web").with_header("x-tenant", "acme")));
    }

    fn bearer() -> BearerConfig {
        BearerConfig {
            tokens: vec![TokenConfig {
                token: "s3cr3t".to_string(),
                subject: "alice".to_string(),
            }],
            ..Default::default()
        }
    }

    fn chain(filters: Vec<FilterConfig>) -> ChainConfig {
        ChainConfig {
            name: "test".to_string(),
            match_: None,
            filters,
        }
    }

    #[test]
    fn test_chain_requires_filters() {
        assert!(matches!(
            ConfiguredChain::new(&chain(vec![])),
            Err(ChainError::NoFilters(_))
        ));
    }

    #[test]
    fn test_chain_reports_bad_regex() {
        let mut config = chain(vec![FilterConfig::Passthrough]);
        config.match_ = Some(chain_match("path:\n  regex: \"(\"\n"));
        let err = ConfiguredChain::new(&config).err().unwrap();
        assert!(err.to_string().contains("chain 'test'"));
    }

    #[tokio::test]
    async fn test_processors_are_independent() {
        let chain = ConfiguredChain::new(&chain(vec![FilterConfig::Bearer(bearer())])).unwrap();
        assert_eq!(chain.name(), "test");

        let mut first = chain.new_processor();
        let mut second = chain.new_processor();

        let mut ok = CheckResponse::new();
        let allowed = request("/").with_header("authorization", "Bearer s3cr3t");
        assert_eq!(first.process(&allowed, &mut ok).await, Code::Ok);

        let mut denied = CheckResponse::new();
        assert_eq!(
            second.process(&request("/"), &mut denied).await,
            Code::Unauthenticated
        );
        assert_eq!(ok.upstream_header("x-authenticated-subject"), Some("alice"));
    }

    #[tokio::test]
    async fn test_sessions_shared_across_processors_and_cleaned() {
        let session = SessionConfig {
            cookie_name: "sid".to_string(),
            absolute_timeout: Duration::from_millis(30),
            idle_timeout: Duration::from_millis(30),
            credentials: bearer(),
        };
        let chain = ConfiguredChain::new(&chain(vec![FilterConfig::Session(session)])).unwrap();

        let mut response = CheckResponse::new();
        let login = request("/").with_header("authorization", "Bearer s3cr3t");
        assert_eq!(chain.new_processor().process(&login, &mut response).await, Code::Ok);
        assert_eq!(chain.session_count(), 1);

        let cookie = response.ok_response().unwrap().response_headers_to_add[0]
            .value
            .split(';')
            .next()
            .unwrap()
            .to_string();
        let mut resumed = CheckResponse::new();
        let with_cookie = request("/").with_header("cookie", cookie);
        assert_eq!(
            chain.new_processor().process(&with_cookie, &mut resumed).await,
            Code::Ok
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        chain.do_periodic_cleanup();
        assert_eq!(chain.session_count(), 0);
    }
}
