//! Server assembly.
//!
//! # Responsibilities
//! - Build the application and admin connectors from configuration
//! - Mount the hosted application and the admin router (stop, metrics)
//! - Set the graceful-shutdown window
//! - Attach registry registration when discovery is enabled
//!
//! The returned server is not started.

use std::sync::Arc;

use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::admin::{admin_router, StopHandler};
use crate::config::ServiceConfig;
use crate::discovery::{ConsulRegistry, DiscoveryLifecycle, ProjectMetadata, RegistryConnector};
use crate::http::server::Server;
use crate::lifecycle::shutdown::ExitHook;
use crate::net::connector::Connector;
use crate::resilience::RetryPolicy;
use crate::routing::RoutingTable;

#[derive(Clone, Default)]
pub struct ServerFactory {
    metadata: ProjectMetadata,
    registry: Option<Arc<dyn RegistryConnector>>,
    retry: Option<RetryPolicy>,
    exit_hook: Option<ExitHook>,
    metrics: Option<PrometheusHandle>,
}

impl ServerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry used when discovery is enabled. Defaults to Consul at the
    /// configured connect string.
    pub fn with_registry(mut self, registry: Arc<dyn RegistryConnector>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Base metadata for the published instance; `[service]` overrides still apply.
    pub fn with_metadata(mut self, metadata: ProjectMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Overrides the retry policy derived from `[discovery]`.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_exit_hook(mut self, hook: ExitHook) -> Self {
        self.exit_hook = Some(hook);
        self
    }

    /// Serve `GET /metrics` on the admin listener from `handle`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn build(&self, config: &ServiceConfig, app: Router) -> Server {
        let application = Connector::application(&config.server);
        let admin = Connector::admin(&config.server);
        tracing::debug!(
            application = %application,
            admin = %admin,
            admin_worker_threads = ?admin.worker_threads,
            "Connectors configured"
        );

        let mut builder = Server::builder()
            .connector(application)
            .connector(admin)
            .graceful_shutdown(config.server.graceful_shutdown());

        if let Some(hook) = &self.exit_hook {
            builder = builder.exit_hook(Arc::clone(hook));
        }

        if config.discovery.enabled {
            let registry: Arc<dyn RegistryConnector> = match &self.registry {
                Some(registry) => Arc::clone(registry),
                None => Arc::new(ConsulRegistry::new(&config.discovery)),
            };
            let metadata = self.metadata.clone().with_overrides(&config.service);
            let mut discovery = DiscoveryLifecycle::new(config.clone(), metadata, registry);
            if let Some(retry) = self.retry {
                discovery = discovery.with_retry_policy(retry);
            }
            builder = builder.listener(discovery);
            tracing::info!(
                connect_string = %config.discovery.connect_string,
                namespace = %config.discovery.namespace,
                "Service discovery enabled"
            );
        }

        let secret = config.server.stop_secret.clone();
        let metrics = self.metrics.clone();
        builder.build_with(move |coordinator| {
            let stop = StopHandler::new(secret, coordinator.clone());
            RoutingTable::standard(app, admin_router(stop, metrics))
        })
    }
}
