//! HTTP server lifecycle.
//!
//! # Responsibilities
//! - Own the connectors, routing table and lifecycle listeners
//! - Bind every connector on start, drain every listener on stop
//! - Report transitions to lifecycle listeners, one event at a time
//! - Expose running/started queries and a join point for the main task
//!
//! # State Machine
//! ```text
//! Stopped/Failed → Starting → Started → Stopping → Stopped
//!                      ↘ Failed (a listener rejected `starting`, or bind failed)
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, Weak};
use std::time::Duration;

use axum::BoxError;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tower_http::trace::TraceLayer;

use crate::lifecycle::events::{LifecycleEvent, LifecycleListener};
use crate::lifecycle::shutdown::{ExitHook, ShutdownCoordinator};
use crate::net::connector::Connector;
use crate::net::listener::{spawn_listener, ListenerError};
use crate::routing::RoutingTable;

/// Default wait for in-flight requests before connections are forced closed.
pub const DEFAULT_GRACEFUL_SHUTDOWN: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Started,
    Stopping,
    Failed,
}

impl ServerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerState::Stopped => "STOPPED",
            ServerState::Starting => "STARTING",
            ServerState::Started => "STARTED",
            ServerState::Stopping => "STOPPING",
            ServerState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Lifecycle listener rejected startup: {0}")]
    Lifecycle(#[source] BoxError),
    #[error("{connector} listener failed: {source}")]
    Listener {
        connector: &'static str,
        #[source]
        source: ListenerError,
    },
    #[error("Cannot start a server that is {0}")]
    IllegalState(ServerState),
    #[error("Server startup aborted: {0}")]
    Aborted(#[source] Arc<ServerError>),
}

/// Cheap-to-clone handle to a server.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

/// Non-owning handle, held by components the server itself owns.
#[derive(Clone)]
pub struct ServerRef {
    inner: Weak<ServerInner>,
}

impl ServerRef {
    pub fn upgrade(&self) -> Option<Server> {
        self.inner.upgrade().map(|inner| Server { inner })
    }
}

struct ServerInner {
    connectors: Vec<Connector>,
    routes: RoutingTable,
    graceful_shutdown: Duration,
    listeners: Mutex<Vec<Box<dyn LifecycleListener>>>,
    /// Serialises start and stop; holds the serving listeners while started.
    transition: Mutex<Option<Running>>,
    state: watch::Sender<ServerState>,
    addresses: std::sync::Mutex<Vec<(&'static str, SocketAddr)>>,
    coordinator: ShutdownCoordinator,
}

struct Running {
    triggers: Vec<watch::Sender<bool>>,
    watchers: JoinSet<()>,
}

pub struct ServerBuilder {
    connectors: Vec<Connector>,
    graceful_shutdown: Duration,
    listeners: Vec<Box<dyn LifecycleListener>>,
    exit_hook: Option<ExitHook>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            connectors: Vec::new(),
            graceful_shutdown: DEFAULT_GRACEFUL_SHUTDOWN,
            listeners: Vec::new(),
            exit_hook: None,
        }
    }
}

impl ServerBuilder {
    pub fn connector(mut self, connector: Connector) -> Self {
        self.connectors.push(connector);
        self
    }

    pub fn graceful_shutdown(mut self, timeout: Duration) -> Self {
        self.graceful_shutdown = timeout;
        self
    }

    pub fn listener(mut self, listener: impl LifecycleListener + 'static) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }

    /// Replace `std::process::exit` as the final step of a requested shutdown.
    pub fn exit_hook(mut self, hook: ExitHook) -> Self {
        self.exit_hook = Some(hook);
        self
    }

    pub fn build(self, routes: RoutingTable) -> Server {
        self.build_with(|_| routes)
    }

    /// Build with routes that need the server's own shutdown coordinator.
    pub fn build_with(self, routes: impl FnOnce(&ShutdownCoordinator) -> RoutingTable) -> Server {
        let ServerBuilder {
            connectors,
            graceful_shutdown,
            listeners,
            exit_hook,
        } = self;

        let inner = Arc::new_cyclic(|weak: &Weak<ServerInner>| {
            let server = ServerRef { inner: weak.clone() };
            let coordinator = match exit_hook {
                Some(hook) => ShutdownCoordinator::with_exit_hook(server, hook),
                None => ShutdownCoordinator::new(server),
            };
            let routes = routes(&coordinator);
            let (state, _) = watch::channel(ServerState::Stopped);

            ServerInner {
                connectors,
                routes,
                graceful_shutdown,
                listeners: Mutex::new(listeners),
                transition: Mutex::new(None),
                state,
                addresses: std::sync::Mutex::new(Vec::new()),
                coordinator,
            }
        });

        Server { inner }
    }
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    pub fn downgrade(&self) -> ServerRef {
        ServerRef {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn state(&self) -> ServerState {
        *self.inner.state.borrow()
    }

    /// Starting or started.
    pub fn is_running(&self) -> bool {
        matches!(self.state(), ServerState::Starting | ServerState::Started)
    }

    pub fn is_started(&self) -> bool {
        self.state() == ServerState::Started
    }

    pub fn connectors(&self) -> &[Connector] {
        &self.inner.connectors
    }

    pub fn graceful_shutdown(&self) -> Duration {
        self.inner.graceful_shutdown
    }

    pub fn shutdown_coordinator(&self) -> &ShutdownCoordinator {
        &self.inner.coordinator
    }

    /// Address a started listener is bound to.
    pub fn local_addr(&self, connector: &str) -> Option<SocketAddr> {
        self.inner
            .addresses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(name, _)| *name == connector)
            .map(|(_, addr)| *addr)
    }

    /// Start the server.
    ///
    /// Listeners see `starting` before any socket is bound; if one of them
    /// fails, `failure` is dispatched and nothing is bound.
    pub async fn start(&self) -> Result<(), ServerError> {
        let mut running = self.inner.transition.lock().await;
        let state = self.state();
        if !matches!(state, ServerState::Stopped | ServerState::Failed) {
            return Err(ServerError::IllegalState(state));
        }

        self.set_state(ServerState::Starting);
        tracing::info!(connectors = self.inner.connectors.len(), "Server starting");

        if let Err(e) = self.dispatch(LifecycleEvent::Starting).await {
            return Err(self.abort(ServerError::Lifecycle(e)).await);
        }

        let mut handles = Vec::with_capacity(self.inner.connectors.len());
        for connector in &self.inner.connectors {
            let router = self
                .inner
                .routes
                .router_for(connector.name)
                .layer(TraceLayer::new_for_http());
            match spawn_listener(connector, router, self.inner.graceful_shutdown).await {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    for handle in handles {
                        let (trigger, finished) = handle.into_parts();
                        let _ = trigger.send(true);
                        let _ = finished.await;
                    }
                    let cause = ServerError::Listener {
                        connector: connector.name,
                        source,
                    };
                    return Err(self.abort(cause).await);
                }
            }
        }

        let mut triggers = Vec::with_capacity(handles.len());
        let mut watchers = JoinSet::new();
        let mut addresses = Vec::with_capacity(handles.len());
        for handle in handles {
            let name = handle.name();
            addresses.push((name, handle.local_addr()));
            let (trigger, finished) = handle.into_parts();
            triggers.push(trigger);

            let server = self.downgrade();
            watchers.spawn(async move {
                if let Err(source) = finished.await {
                    tracing::error!(listener = name, error = %source, "Listener failed");
                    if let Some(server) = server.upgrade() {
                        let cause = ServerError::Listener {
                            connector: name,
                            source,
                        };
                        let _ = server.dispatch(LifecycleEvent::Failure(Arc::new(cause))).await;
                    }
                }
            });
        }
        *self
            .inner
            .addresses
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = addresses;
        *running = Some(Running { triggers, watchers });

        self.set_state(ServerState::Started);
        tracing::info!("Server started");
        let _ = self.dispatch(LifecycleEvent::Started).await;
        Ok(())
    }

    /// Stop a started server. In any other state this is a no-op.
    pub async fn stop(&self) -> Result<(), ServerError> {
        let mut running = self.inner.transition.lock().await;
        let state = self.state();
        if state != ServerState::Started {
            tracing::debug!(state = %state, "Stop ignored, server not started");
            return Ok(());
        }

        self.set_state(ServerState::Stopping);
        tracing::info!(
            graceful_shutdown_ms = self.inner.graceful_shutdown.as_millis() as u64,
            "Server stopping"
        );
        let _ = self.dispatch(LifecycleEvent::Stopping).await;

        if let Some(Running {
            triggers,
            mut watchers,
        }) = running.take()
        {
            for trigger in &triggers {
                let _ = trigger.send(true);
            }
            while watchers.join_next().await.is_some() {}
        }
        self.inner
            .addresses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let _ = self.dispatch(LifecycleEvent::Stopped).await;
        // Published last: join() returns only after listeners saw `stopped`.
        self.set_state(ServerState::Stopped);
        tracing::info!("Server stopped");
        Ok(())
    }

    /// Wait until the server is stopped or failed.
    pub async fn join(&self) {
        let mut state = self.inner.state.subscribe();
        let _ = state
            .wait_for(|s| matches!(s, ServerState::Stopped | ServerState::Failed))
            .await;
    }

    fn set_state(&self, state: ServerState) {
        let previous = self.inner.state.send_replace(state);
        tracing::debug!(from = %previous, to = %state, "Server state changed");
    }

    async fn abort(&self, cause: ServerError) -> ServerError {
        tracing::error!(error = %cause, "Server failed to start");
        let cause = Arc::new(cause);
        let _ = self
            .dispatch(LifecycleEvent::Failure(Arc::clone(&cause)))
            .await;
        self.set_state(ServerState::Failed);
        ServerError::Aborted(cause)
    }

    /// Deliver `event` to every listener in registration order.
    ///
    /// Only `starting` propagates a listener error (the first one); every
    /// other event is delivered to all listeners and errors are logged.
    async fn dispatch(&self, event: LifecycleEvent) -> Result<(), BoxError> {
        let mut listeners = self.inner.listeners.lock().await;
        for listener in listeners.iter_mut() {
            if let Err(e) = listener.on_event(&event).await {
                if matches!(event, LifecycleEvent::Starting) {
                    return Err(e);
                }
                tracing::error!(event = event.name(), error = %e, "Lifecycle listener failed");
            }
        }
        Ok(())
    }
}
