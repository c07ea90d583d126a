//! Server lifecycle events and the listener contract.

use std::sync::Arc;

use async_trait::async_trait;
use axum::BoxError;

use crate::http::server::ServerError;

/// A transition reported by the server.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Starting,
    Started,
    Stopping,
    Stopped,
    Failure(Arc<ServerError>),
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Starting => "starting",
            LifecycleEvent::Started => "started",
            LifecycleEvent::Stopping => "stopping",
            LifecycleEvent::Stopped => "stopped",
            LifecycleEvent::Failure(_) => "failure",
        }
    }
}

/// Observer of server lifecycle events.
///
/// The server delivers events one at a time, so implementations never see
/// concurrent calls. An error returned for [`LifecycleEvent::Starting`] aborts
/// startup; errors for every other event are logged by the server.
#[async_trait]
pub trait LifecycleListener: Send {
    async fn on_event(&mut self, event: &LifecycleEvent) -> Result<(), BoxError>;
}
