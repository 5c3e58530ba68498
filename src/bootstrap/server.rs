use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, span, warn, Instrument, Level};

use crate::api::{admin_router, check_router, envoy_router, AdminContext, CheckState};
use crate::config::Config;
use crate::service::AuthService;
use crate::telemetry::{counters, AdminState};

use super::cleanup::CleanupTicker;
use super::shutdown::{ShutdownManager, ShutdownState};

/// Main authservice server
///
/// Components:
/// - Check listener: JSON authorization checks
/// - Envoy listener (optional): Envoy HTTP-mode authorization checks
/// - Admin listener: health, stats and Prometheus endpoints
/// - Cleanup ticker: periodic chain maintenance
/// - Shutdown manager: graceful drain with configurable timeout
pub struct Server {
    config: Arc<Config>,
    service: Arc<AuthService>,
    admin: Arc<AdminState>,
    shutdown: Arc<ShutdownManager>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Result<Self> {
        counters::init().context("failed to register metrics")?;

        let service = Arc::new(AuthService::new(&config)?);
        let shutdown = ShutdownManager::new(config.settings.shutdown.drain_timeout);

        Ok(Self {
            config: Arc::new(config),
            service,
            admin: Arc::new(AdminState::new()),
            shutdown,
        })
    }

    /// Run the server until a shutdown signal arrives
    pub async fn run(self) -> Result<()> {
        let span = span!(Level::INFO, "authservice", version = env!("CARGO_PKG_VERSION"));

        let check_listener = TcpListener::bind(self.config.listen)
            .await
            .with_context(|| format!("failed to bind check listener on {}", self.config.listen))?;
        let admin_listener = TcpListener::bind(self.config.admin.address)
            .await
            .with_context(|| {
                format!("failed to bind admin listener on {}", self.config.admin.address)
            })?;
        let envoy_listener = match self.config.envoy_listen {
            Some(address) => Some(TcpListener::bind(address).await.with_context(|| {
                format!("failed to bind envoy listener on {}", address)
            })?),
            None => None,
        };

        self.serve(check_listener, envoy_listener, admin_listener)
            .instrument(span)
            .await
    }

    /// Serve on already bound listeners until a shutdown signal arrives
    pub async fn serve(
        self,
        check_listener: TcpListener,
        envoy_listener: Option<TcpListener>,
        admin_listener: TcpListener,
    ) -> Result<()> {
        let check_address = check_listener.local_addr()?;
        let envoy_address = envoy_listener
            .as_ref()
            .map(TcpListener::local_addr)
            .transpose()?;
        let admin_address = admin_listener.local_addr()?;

        let check_state = Arc::new(CheckState::new(self.service.clone(), self.admin.clone()));

        // Check listener
        let check_app = check_router(check_state.clone());
        let check_drain = self.shutdown.draining();
        let mut check_handle = tokio::spawn(async move {
            axum::serve(check_listener, check_app)
                .with_graceful_shutdown(check_drain)
                .await
        });

        // Envoy listener
        let mut envoy_handle = envoy_listener.map(|listener| {
            let envoy_app = envoy_router(check_state);
            let envoy_drain = self.shutdown.draining();
            tokio::spawn(async move {
                axum::serve(
                    listener,
                    envoy_app.into_make_service_with_connect_info::<SocketAddr>(),
                )
                .with_graceful_shutdown(envoy_drain)
                .await
            })
        });

        // Admin listener
        let admin_app = admin_router(
            &self.config.admin,
            Arc::new(AdminContext {
                state: self.admin.clone(),
                service: self.service.clone(),
            }),
        );
        let mut admin_rx = self.shutdown.subscribe();
        let admin_handle = tokio::spawn(async move {
            axum::serve(admin_listener, admin_app)
                .with_graceful_shutdown(async move {
                    let _ = admin_rx
                        .wait_for(|state| *state == ShutdownState::Terminated)
                        .await;
                    info!("admin server shutting down");
                })
                .await
        });

        // Cleanup ticker
        let ticker = CleanupTicker::new(
            self.service.clone(),
            self.admin.clone(),
            self.config.settings.cleanup_interval,
        );
        let cleanup_handle = tokio::spawn(ticker.run(self.shutdown.subscribe()));

        for name in self.service.chain_names() {
            info!(chain = %name, "filter chain configured");
        }

        self.admin.set_ready(true);
        info!(
            check_address = %check_address,
            envoy_address = ?envoy_address,
            admin_address = %admin_address,
            chains = self.service.chain_count(),
            trigger_rules = self.config.trigger_rules.len(),
            cleanup_interval_ms = self.config.settings.cleanup_interval.as_millis() as u64,
            drain_timeout_secs = self.config.settings.shutdown.drain_timeout.as_secs(),
            "authservice started"
        );

        tokio::select! {
            signal = wait_for_signal() => {
                signal?;
                info!("shutdown signal received, starting graceful shutdown");
            }
            _ = self.shutdown.draining() => {
                info!("shutdown requested, starting graceful shutdown");
            }
            result = &mut check_handle => {
                // The check listener only stops on its own when it fails.
                self.admin.set_healthy(false);
                match result {
                    Ok(Err(e)) => error!(error = %e, "check server failed"),
                    Err(e) => error!(error = %e, "check server task failed"),
                    Ok(Ok(())) => warn!("check server stopped unexpectedly"),
                }
            }
        }

        self.admin.set_ready(false);
        self.shutdown.start_drain();

        let deadline = tokio::time::Instant::now() + self.shutdown.drain_period();
        drain_server("check", &mut check_handle, deadline, &self.admin).await;
        if let Some(handle) = envoy_handle.as_mut() {
            drain_server("envoy", handle, deadline, &self.admin).await;
        }

        let _ = cleanup_handle.await;

        self.shutdown.terminate();
        match admin_handle.await {
            Ok(Err(e)) => error!(error = %e, "admin server failed"),
            Err(e) => error!(error = %e, "admin server task failed"),
            Ok(Ok(())) => {}
        }

        info!("authservice stopped");

        Ok(())
    }

    /// Get the dispatcher
    pub fn service(&self) -> Arc<AuthService> {
        self.service.clone()
    }

    /// Get shutdown manager
    pub fn shutdown_manager(&self) -> Arc<ShutdownManager> {
        self.shutdown.clone()
    }
}

/// Wait for a draining listener until `deadline`, then abort it.
async fn drain_server(
    listener: &str,
    handle: &mut JoinHandle<std::io::Result<()>>,
    deadline: tokio::time::Instant,
    admin: &AdminState,
) {
    if handle.is_finished() {
        return;
    }

    match tokio::time::timeout_at(deadline, &mut *handle).await {
        Ok(Ok(Err(e))) => error!(listener, error = %e, "server failed while draining"),
        Ok(_) => info!(listener, "in-flight checks drained"),
        Err(_) => {
            warn!(
                listener,
                active_checks = admin.active_checks(),
                "drain timeout reached, forcing shutdown"
            );
            handle.abort();
        }
    }
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("failed to install Ctrl+C handler")?;
                info!("received SIGINT (Ctrl+C)");
            }
            _ = terminate.recv() => {
                info!("received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .context("failed to install Ctrl+C handler")?;
        info!("received SIGINT (Ctrl+C)");
    }

    Ok(())
}
