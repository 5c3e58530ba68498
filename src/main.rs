use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use authservice::bootstrap::Server;
use authservice::config::Config;
use authservice::telemetry::{init_tracing, TracingConfig};

#[derive(Parser, Debug)]
#[command(name = "authservice")]
#[command(author, version, about = "External authorization service with filter chains")]
struct Args {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Validate config and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first (to get log and runtime settings)
    let config = Config::load(&args.config)?;

    init_tracing(&TracingConfig::from(&config.settings))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "starting authservice"
    );

    info!(
        trigger_rules = config.trigger_rules.len(),
        chains = config.chains.len(),
        "configuration loaded"
    );

    if args.validate {
        info!("configuration is valid");
        return Ok(());
    }

    let threads = if config.threads == 0 {
        num_cpus::get()
    } else {
        config.threads
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads)
        .thread_name("authservice-worker")
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    info!(threads, "runtime started");

    runtime.block_on(async move {
        let server = Server::new(config)?;
        server.run().await
    })
}
