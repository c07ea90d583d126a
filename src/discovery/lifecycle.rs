//! Registration of the running instance, driven by server lifecycle events.
//!
//! | Event      | Registry action                                  | Status   |
//! |------------|--------------------------------------------------|----------|
//! | `starting` | connect, register a new instance                 | STARTING |
//! | `started`  | update                                           | RUNNING  |
//! | `stopping` | update                                           | STOPPING |
//! | `stopped`  | update, unregister, release the connection       | STOPPED  |
//! | `failure`  | update, unregister, release the connection       | FAILED   |
//!
//! Registration happens before the server accepts traffic so a failed
//! registration aborts startup. Both terminal events release the connection
//! unconditionally, even when the status update before them fails.

use std::sync::Arc;

use async_trait::async_trait;
use axum::BoxError;
use thiserror::Error;

use crate::config::ServiceConfig;
use crate::discovery::instance::{ServiceInstance, ServiceStatus};
use crate::discovery::metadata::ProjectMetadata;
use crate::discovery::registry::{RegistryConnection, RegistryConnector, RegistryError};
use crate::lifecycle::events::{LifecycleEvent, LifecycleListener};
use crate::observability::metrics;
use crate::resilience::RetryPolicy;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Unable to connect to the service registry: {0}")]
    Connect(#[source] RegistryError),
    #[error("Error registering the service: {0}")]
    Register(#[source] RegistryError),
    #[error("Error updating service status to {status}: {source}")]
    Update {
        status: ServiceStatus,
        #[source]
        source: RegistryError,
    },
    #[error("Error unregistering the service: {0}")]
    Unregister(#[source] RegistryError),
    #[error("Error releasing the registry connection: {0}")]
    Close(#[source] RegistryError),
}

/// Lifecycle listener that keeps this process registered while it runs.
pub struct DiscoveryLifecycle {
    config: ServiceConfig,
    metadata: ProjectMetadata,
    connector: Arc<dyn RegistryConnector>,
    retry: RetryPolicy,
    connection: Option<Box<dyn RegistryConnection>>,
    instance: Option<ServiceInstance>,
}

impl DiscoveryLifecycle {
    pub fn new(
        config: ServiceConfig,
        metadata: ProjectMetadata,
        connector: Arc<dyn RegistryConnector>,
    ) -> Self {
        let retry = RetryPolicy::from(&config.discovery);
        Self {
            config,
            metadata,
            connector,
            retry,
            connection: None,
            instance: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The registered instance, if any.
    pub fn instance(&self) -> Option<&ServiceInstance> {
        self.instance.as_ref()
    }

    /// Whether a registry connection is currently held.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    async fn register(&mut self) -> Result<(), DiscoveryError> {
        if self.connection.is_some() {
            // Leftover from a run that never reached a terminal event.
            if let Err(e) = self.release().await {
                tracing::warn!(error = %e, "Releasing stale registry state failed");
            }
        }

        let connector = Arc::clone(&self.connector);
        let connection = self
            .retry
            .run("connect", || connector.connect())
            .await
            .map_err(|e| {
                metrics::record_registry_operation("connect", false);
                DiscoveryError::Connect(e)
            })?;
        metrics::record_registry_operation("connect", true);
        tracing::info!("Registry connection opened");

        let instance = ServiceInstance::new(&self.config, &self.metadata, ServiceStatus::Starting);
        tracing::info!(
            name = %instance.name,
            id = %instance.id,
            url = %instance.uri,
            "Registering service"
        );
        let registered = self
            .retry
            .run("register", || connection.register(&instance))
            .await;
        // Keep the connection even on failure so the terminal event releases it.
        self.connection = Some(connection);
        metrics::record_registry_operation("register", registered.is_ok());
        registered.map_err(DiscoveryError::Register)?;

        metrics::record_service_status(ServiceStatus::Starting);
        tracing::info!(id = %instance.id, "Service registered");
        self.instance = Some(instance);
        Ok(())
    }

    async fn update_status(&mut self, status: ServiceStatus) -> Result<(), DiscoveryError> {
        let retry = self.retry;
        let (Some(connection), Some(instance)) = (self.connection.as_ref(), self.instance.as_mut())
        else {
            tracing::debug!(status = %status, "No registered instance, skipping status update");
            return Ok(());
        };

        instance.set_status(status);
        let instance = &*instance;
        let updated = retry.run("update", || connection.update(instance)).await;
        metrics::record_registry_operation("update", updated.is_ok());
        updated.map_err(|source| DiscoveryError::Update { status, source })?;

        metrics::record_service_status(status);
        tracing::info!(id = %instance.id, status = %status, "Service status updated");
        Ok(())
    }

    /// Unregister the instance (if any) and release the connection (if any).
    ///
    /// Both steps run even if the first fails; the first error is returned.
    async fn release(&mut self) -> Result<(), DiscoveryError> {
        let retry = self.retry;
        let mut result = Ok(());

        if let (Some(instance), Some(connection)) = (self.instance.take(), self.connection.as_ref()) {
            let unregistered = retry.run("unregister", || connection.unregister(&instance)).await;
            metrics::record_registry_operation("unregister", unregistered.is_ok());
            match unregistered {
                Ok(()) => tracing::info!(id = %instance.id, "Service instance has been unregistered"),
                Err(e) => {
                    tracing::error!(id = %instance.id, error = %e, "Error unregistering service");
                    result = Err(DiscoveryError::Unregister(e));
                }
            }
        }

        if let Some(connection) = self.connection.take() {
            match connection.close().await {
                Ok(()) => tracing::info!("Registry connection released"),
                Err(e) => {
                    tracing::error!(error = %e, "Error closing registry connection");
                    if result.is_ok() {
                        result = Err(DiscoveryError::Close(e));
                    }
                }
            }
        }

        result
    }

    async fn terminate(&mut self, status: ServiceStatus) -> Result<(), DiscoveryError> {
        let updated = self.update_status(status).await;
        if let Err(e) = &updated {
            tracing::warn!(error = %e, "Status update failed, unregistering anyway");
        }
        let released = self.release().await;
        updated.and(released)
    }
}

#[async_trait]
impl LifecycleListener for DiscoveryLifecycle {
    async fn on_event(&mut self, event: &LifecycleEvent) -> Result<(), BoxError> {
        tracing::debug!(event = event.name(), "Discovery lifecycle event");
        let result = match event {
            LifecycleEvent::Starting => self.register().await,
            LifecycleEvent::Started => self.update_status(ServiceStatus::Running).await,
            LifecycleEvent::Stopping => self.update_status(ServiceStatus::Stopping).await,
            LifecycleEvent::Stopped => {
                let result = self.terminate(ServiceStatus::Stopped).await;
                tracing::info!("Discovery services have been stopped");
                result
            }
            LifecycleEvent::Failure(cause) => {
                tracing::warn!(error = %cause, "Server failure, unregistering service");
                self.terminate(ServiceStatus::Failed).await
            }
        };
        result.map_err(BoxError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::memory::MemoryRegistry;
    use crate::http::server::ServerError;
    use crate::net::listener::ListenerError;
    use std::time::Duration;

    fn config() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.server.host = "ws.example.org".into();
        config.discovery.enabled = true;
        config
    }

    fn lifecycle(registry: &MemoryRegistry) -> DiscoveryLifecycle {
        DiscoveryLifecycle::new(
            config(),
            ProjectMetadata::from_cargo(),
            Arc::new(registry.clone()),
        )
        .with_retry_policy(RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            max_retries: 3,
        })
    }

    fn failure() -> LifecycleEvent {
        LifecycleEvent::Failure(Arc::new(ServerError::Listener {
            connector: "application",
            source: ListenerError::Accept(std::io::Error::other("accept failed")),
        }))
    }

    #[tokio::test]
    async fn starting_registers_exactly_one_instance() {
        let registry = MemoryRegistry::new();
        let mut discovery = lifecycle(&registry);

        discovery.on_event(&LifecycleEvent::Starting).await.unwrap();

        let instances = registry.instances();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].status(), ServiceStatus::Starting);
        assert_eq!(instances[0].uri, "http://ws.example.org:8080/");
        assert_eq!(registry.stats().registers, 1);
        assert!(discovery.is_connected());
    }

    #[tokio::test]
    async fn started_updates_instead_of_registering_again() {
        let registry = MemoryRegistry::new();
        let mut discovery = lifecycle(&registry);

        discovery.on_event(&LifecycleEvent::Starting).await.unwrap();
        let id = discovery.instance().unwrap().id;
        discovery.on_event(&LifecycleEvent::Started).await.unwrap();

        let instances = registry.instances();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].id, id);
        assert_eq!(instances[0].status(), ServiceStatus::Running);
        assert_eq!(registry.stats().registers, 1);
        assert_eq!(registry.stats().updates, 1);
    }

    #[tokio::test]
    async fn stopped_unregisters_and_releases_once() {
        let registry = MemoryRegistry::new();
        let mut discovery = lifecycle(&registry);

        for event in [
            LifecycleEvent::Starting,
            LifecycleEvent::Started,
            LifecycleEvent::Stopping,
            LifecycleEvent::Stopped,
        ] {
            discovery.on_event(&event).await.unwrap();
        }
        // A late duplicate must not touch the registry again.
        discovery.on_event(&LifecycleEvent::Stopped).await.unwrap();

        let stats = registry.stats();
        assert!(registry.instances().is_empty());
        assert_eq!(stats.updates, 3);
        assert_eq!(stats.unregisters, 1);
        assert_eq!(stats.closes, 1);
        assert!(!discovery.is_connected());
    }

    #[tokio::test]
    async fn failure_unregisters_and_releases() {
        let registry = MemoryRegistry::new();
        let mut discovery = lifecycle(&registry);

        discovery.on_event(&LifecycleEvent::Starting).await.unwrap();
        discovery.on_event(&failure()).await.unwrap();
        discovery.on_event(&LifecycleEvent::Stopped).await.unwrap();

        let stats = registry.stats();
        assert!(registry.instances().is_empty());
        assert_eq!(stats.unregisters, 1);
        assert_eq!(stats.closes, 1);
    }

    #[tokio::test]
    async fn terminal_events_without_registration_are_noops() {
        let registry = MemoryRegistry::new();

        for event in [LifecycleEvent::Stopping, LifecycleEvent::Stopped, failure()] {
            let mut discovery = lifecycle(&registry);
            discovery.on_event(&event).await.unwrap();
        }

        assert_eq!(registry.stats(), Default::default());
    }

    #[tokio::test]
    async fn unreachable_registry_fails_starting_after_retries() {
        let registry = MemoryRegistry::new();
        registry.set_unreachable(true);
        let mut discovery = lifecycle(&registry);

        let err = discovery.on_event(&LifecycleEvent::Starting).await.unwrap_err();
        assert!(err.to_string().contains("connect"), "unexpected error: {err}");
        assert_eq!(registry.stats().connect_attempts, 4);
        assert!(discovery.instance().is_none());

        // The failure event that follows has nothing to release.
        discovery.on_event(&failure()).await.unwrap();
        assert_eq!(registry.stats().closes, 0);
    }

    #[tokio::test]
    async fn transient_outage_is_retried() {
        let registry = MemoryRegistry::new();
        registry.fail_next_connects(2);
        let mut discovery = lifecycle(&registry);

        discovery.on_event(&LifecycleEvent::Starting).await.unwrap();
        assert_eq!(registry.stats().connect_attempts, 3);
        assert_eq!(registry.instances().len(), 1);
    }

    #[tokio::test]
    async fn failed_status_update_still_releases_connection() {
        let registry = MemoryRegistry::new();
        let mut discovery = lifecycle(&registry);

        discovery.on_event(&LifecycleEvent::Starting).await.unwrap();
        // Simulate the record vanishing underneath us: the RUNNING update fails.
        registry
            .connect()
            .await
            .unwrap()
            .unregister(discovery.instance().unwrap())
            .await
            .unwrap();
        assert!(discovery.on_event(&LifecycleEvent::Started).await.is_err());

        discovery.on_event(&LifecycleEvent::Stopped).await.unwrap_err();
        assert_eq!(registry.stats().closes, 1);
        assert!(!discovery.is_connected());
    }
}
