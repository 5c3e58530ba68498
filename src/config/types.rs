use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// Root configuration for authservice
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address of the JSON check listener
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Address of the Envoy HTTP-mode listener. Every request it receives is
    /// checked; disabled when unset.
    #[serde(default)]
    pub envoy_listen: Option<SocketAddr>,

    /// Runtime worker threads (0 = number of CPUs)
    #[serde(default)]
    pub threads: usize,

    /// Rules deciding whether a request is processed at all
    #[serde(default)]
    pub trigger_rules: Vec<TriggerRuleConfig>,

    /// Filter chains, evaluated in order; the first match wins
    #[serde(default)]
    pub chains: Vec<ChainConfig>,

    /// Admin API configuration
    #[serde(default)]
    pub admin: AdminConfig,

    /// Global settings
    #[serde(default)]
    pub settings: Settings,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 10003))
}

/// String match condition. Exactly one field should be set.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct StringMatch {
    /// Exact match
    #[serde(default, alias = "equality")]
    pub exact: Option<String>,

    /// Prefix match (empty prefix matches anything)
    #[serde(default)]
    pub prefix: Option<String>,

    /// Suffix match
    #[serde(default)]
    pub suffix: Option<String>,

    /// Regex match against the whole value
    #[serde(default)]
    pub regex: Option<String>,
}

impl StringMatch {
    /// Number of conditions set.
    pub fn conditions(&self) -> usize {
        [&self.exact, &self.prefix, &self.suffix, &self.regex]
            .iter()
            .filter(|c| c.is_some())
            .count()
    }
}

/// Trigger rule configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerRuleConfig {
    /// Paths that disable processing
    #[serde(default)]
    pub excluded_paths: Vec<StringMatch>,

    /// Paths that enable processing (empty = all paths)
    #[serde(default)]
    pub included_paths: Vec<StringMatch>,
}

/// Filter chain configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Chain name (unique, used in logs and metrics)
    pub name: String,

    /// Request selection criteria (absent = match everything)
    #[serde(default, rename = "match")]
    pub match_: Option<ChainMatch>,

    /// Filters, run in order
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
}

/// Chain selection criteria. All configured criteria must hold.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainMatch {
    /// Header to inspect; pseudo-headers like `:path` are supported
    #[serde(default)]
    pub header: Option<String>,

    /// Header value must equal
    #[serde(default, alias = "equality")]
    pub exact: Option<String>,

    /// Header value must start with
    #[serde(default)]
    pub prefix: Option<String>,

    /// Header value must end with
    #[serde(default)]
    pub suffix: Option<String>,

    /// Header value must match
    #[serde(default)]
    pub regex: Option<String>,

    /// Host match (port stripped)
    #[serde(default)]
    pub host: Option<StringMatch>,

    /// Path match (query and fragment stripped)
    #[serde(default)]
    pub path: Option<StringMatch>,
}

impl ChainMatch {
    /// The condition applied to the header value.
    pub fn header_condition(&self) -> StringMatch {
        StringMatch {
            exact: self.exact.clone(),
            prefix: self.prefix.clone(),
            suffix: self.suffix.clone(),
            regex: self.regex.clone(),
        }
    }
}

/// Filter configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterConfig {
    /// Always succeeds
    Passthrough,
    /// Static bearer token validation
    Bearer(BearerConfig),
    /// Cookie session backed by the chain's session store
    Session(SessionConfig),
}

impl FilterConfig {
    pub fn type_name(&self) -> &'static str {
        match self {
            FilterConfig::Passthrough => "passthrough",
            FilterConfig::Bearer(_) => "bearer",
            FilterConfig::Session(_) => "session",
        }
    }
}

/// Bearer token filter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BearerConfig {
    /// Header carrying the credential
    #[serde(default = "default_auth_header")]
    pub header: String,

    /// Expected authorization scheme
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Realm advertised in `www-authenticate`
    #[serde(default = "default_realm")]
    pub realm: String,

    /// Accepted tokens
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,

    /// Subjects allowed through (empty = every known subject)
    #[serde(default)]
    pub allowed_subjects: Vec<String>,

    /// Upstream header receiving the authenticated subject
    #[serde(default = "default_subject_header")]
    pub subject_header: String,

    /// Remove the credential header from the upstream request
    #[serde(default)]
    pub strip_header: bool,
}

impl Default for BearerConfig {
    fn default() -> Self {
        Self {
            header: default_auth_header(),
            scheme: default_scheme(),
            realm: default_realm(),
            tokens: Vec::new(),
            allowed_subjects: Vec::new(),
            subject_header: default_subject_header(),
            strip_header: false,
        }
    }
}

fn default_auth_header() -> String {
    "authorization".to_string()
}

fn default_scheme() -> String {
    "Bearer".to_string()
}

fn default_realm() -> String {
    "authservice".to_string()
}

fn default_subject_header() -> String {
    "x-authenticated-subject".to_string()
}

/// A token and the subject it authenticates.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TokenConfig {
    pub token: String,
    pub subject: String,
}

/// Session filter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session cookie name
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Maximum session lifetime
    #[serde(default = "default_absolute_timeout", with = "humantime_serde")]
    pub absolute_timeout: Duration,

    /// Maximum time between uses
    #[serde(default = "default_idle_timeout", with = "humantime_serde")]
    pub idle_timeout: Duration,

    /// Credentials accepted to start a session
    #[serde(default)]
    pub credentials: BearerConfig,
}

fn default_cookie_name() -> String {
    "authservice-session".to_string()
}

fn default_absolute_timeout() -> Duration {
    Duration::from_secs(8 * 3600)
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

/// Admin API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// HTTP API address
    #[serde(default = "default_admin_address")]
    pub address: SocketAddr,

    /// Enable metrics endpoint
    #[serde(default = "default_true")]
    pub metrics: bool,

    /// Enable health endpoint
    #[serde(default = "default_true")]
    pub health: bool,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            address: default_admin_address(),
            metrics: true,
            health: true,
        }
    }
}

fn default_admin_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9090))
}

fn default_true() -> bool {
    true
}

/// Global settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Enable structured JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Interval between chain cleanup sweeps
    #[serde(default = "default_cleanup_interval", with = "humantime_serde")]
    pub cleanup_interval: Duration,

    /// Shutdown configuration
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            json_logs: false,
            log_level: default_log_level(),
            cleanup_interval: default_cleanup_interval(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(60)
}

/// Shutdown configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownConfig {
    /// How long in-flight checks may take to finish
    #[serde(default = "default_drain_timeout", with = "humantime_serde")]
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: default_drain_timeout(),
        }
    }
}

fn default_drain_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Humantime serde support module
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
