use anyhow::Result;
use tracing::info;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::Settings;

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Service name
    pub service_name: String,

    /// Log level, used when `RUST_LOG` is unset
    pub log_level: String,

    /// JSON log format
    pub json_logs: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "authservice".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl From<&Settings> for TracingConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            log_level: settings.log_level.clone(),
            json_logs: settings.json_logs,
            ..Default::default()
        }
    }
}

/// Initialize the global tracing subscriber.
pub fn init_tracing(config: &TracingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.json_logs {
        let fmt_layer = fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true);
        subscriber.with(fmt_layer).try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .pretty()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true);
        subscriber.with(fmt_layer).try_init()?;
    }

    info!(
        service = %config.service_name,
        log_level = %config.log_level,
        json_logs = config.json_logs,
        "tracing initialized"
    );

    Ok(())
}
