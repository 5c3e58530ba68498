mod metrics;
mod tracing;

pub use self::metrics::{counters, render, AdminState, CheckStats};
pub use self::tracing::{init_tracing, TracingConfig};
