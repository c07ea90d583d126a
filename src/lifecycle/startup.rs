//! Startup orchestration.
//!
//! # Responsibilities
//! - Install the metrics recorder when enabled
//! - Assemble the server and hook OS signals to the shutdown coordinator
//! - Start the server and wait until it stops
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Registration (if enabled) happens inside `start`, before traffic
//! - Listeners start last (traffic only when ready)

use axum::Router;
use metrics_exporter_prometheus::BuildError;
use thiserror::Error;

use crate::config::{validate_config, ServiceConfig, ValidationError};
use crate::http::server::{Server, ServerError};
use crate::http::ServerFactory;
use crate::lifecycle::shutdown::ShutdownCoordinator;
use crate::lifecycle::signals;
use crate::net::connector::{ADMIN, APPLICATION};
use crate::observability::metrics;

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Invalid configuration: {}", join_errors(.0))]
    Config(Vec<ValidationError>),
    #[error("Failed to install metrics recorder: {0}")]
    Metrics(#[from] BuildError),
    #[error(transparent)]
    Server(#[from] ServerError),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Host `app` until the process is asked to stop.
pub async fn run(config: &ServiceConfig, app: Router) -> Result<(), StartupError> {
    run_with(ServerFactory::new(), config, app).await
}

/// Like [`run`] with a preconfigured factory (registry, exit hook, metadata).
pub async fn run_with(
    mut factory: ServerFactory,
    config: &ServiceConfig,
    app: Router,
) -> Result<(), StartupError> {
    validate_config(config).map_err(StartupError::Config)?;

    if config.observability.metrics_enabled {
        factory = factory.with_metrics(metrics::init_metrics()?);
    }

    let server = factory.build(config, app);
    let coordinator = server.shutdown_coordinator().clone();
    let signals = signals::install_shutdown_hook(coordinator.clone());

    let result = serve_until_stopped(&server, &coordinator).await;
    signals.abort();
    result
}

async fn serve_until_stopped(
    server: &Server,
    coordinator: &ShutdownCoordinator,
) -> Result<(), StartupError> {
    server.start().await?;

    // A signal that arrived while starting found nothing to stop.
    if coordinator.is_triggered() {
        server.stop().await?;
        return Ok(());
    }

    tracing::info!(
        application = ?server.local_addr(APPLICATION),
        admin = ?server.local_addr(ADMIN),
        "Service ready"
    );

    server.join().await;
    // No-op unless the server stopped without going through the coordinator.
    coordinator.request_shutdown().await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
