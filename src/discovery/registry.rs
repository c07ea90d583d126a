//! Registry client abstraction.
//!
//! A [`RegistryConnector`] opens a [`RegistryConnection`]; the connection
//! publishes, updates and removes [`ServiceInstance`] records and must be
//! released with [`RegistryConnection::close`].

use async_trait::async_trait;
use thiserror::Error;

use crate::discovery::instance::ServiceInstance;
use crate::resilience::Retryable;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Registry returned error: {status} - {message}")]
    Status { status: u16, message: String },
    #[error("Registry unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid registry connect string '{0}'")]
    InvalidConnectString(String),
    #[error("Instance not registered: {0}")]
    NotRegistered(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Registry connection already closed")]
    Closed,
}

impl Retryable for RegistryError {
    fn is_transient(&self) -> bool {
        match self {
            RegistryError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            RegistryError::Status { status, .. } => *status >= 500,
            RegistryError::Unavailable(_) => true,
            RegistryError::InvalidConnectString(_)
            | RegistryError::NotRegistered(_)
            | RegistryError::Serialization(_)
            | RegistryError::Closed => false,
        }
    }
}

/// Opens connections to a registry.
#[async_trait]
pub trait RegistryConnector: Send + Sync {
    /// Connect and verify the registry is reachable.
    async fn connect(&self) -> Result<Box<dyn RegistryConnection>, RegistryError>;
}

/// A live connection to a registry.
#[async_trait]
pub trait RegistryConnection: Send + Sync {
    /// Publish a new instance.
    async fn register(&self, instance: &ServiceInstance) -> Result<(), RegistryError>;

    /// Replace the stored record of an already registered instance.
    async fn update(&self, instance: &ServiceInstance) -> Result<(), RegistryError>;

    /// Remove an instance. Removing an unknown instance is not an error.
    async fn unregister(&self, instance: &ServiceInstance) -> Result<(), RegistryError>;

    /// Release the connection. Further calls fail with [`RegistryError::Closed`].
    async fn close(&self) -> Result<(), RegistryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(RegistryError::Unavailable("down".into()).is_transient());
        assert!(RegistryError::Status { status: 503, message: String::new() }.is_transient());
        assert!(!RegistryError::Status { status: 403, message: String::new() }.is_transient());
        assert!(!RegistryError::Closed.is_transient());
        assert!(!RegistryError::InvalidConnectString("::".into()).is_transient());
        assert!(!RegistryError::NotRegistered("svc/1".into()).is_transient());
    }
}
