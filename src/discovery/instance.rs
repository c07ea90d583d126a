//! The record published to the registry for this process.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::discovery::metadata::ProjectMetadata;

/// Status of the running instance as seen by registry consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Starting => "STARTING",
            ServiceStatus::Running => "RUNNING",
            ServiceStatus::Stopping => "STOPPING",
            ServiceStatus::Stopped => "STOPPED",
            ServiceStatus::Failed => "FAILED",
        }
    }

    /// Numeric form used by the `service_status` gauge.
    pub fn code(&self) -> f64 {
        match self {
            ServiceStatus::Starting => 0.0,
            ServiceStatus::Running => 1.0,
            ServiceStatus::Stopping => 2.0,
            ServiceStatus::Stopped => 3.0,
            ServiceStatus::Failed => 4.0,
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The part of the configuration that is safe to publish.
///
/// The stop secret is deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationSnapshot {
    pub host: String,
    pub http_port: u16,
    pub http_admin_port: u16,
    pub external_port: Option<u16>,
    pub namespace: String,
}

impl From<&ServiceConfig> for ConfigurationSnapshot {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            host: config.server.host.clone(),
            http_port: config.server.http_port,
            http_admin_port: config.server.http_admin_port,
            external_port: config.server.external_port,
            namespace: config.discovery.namespace.clone(),
        }
    }
}

/// Payload of the registry record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDetails {
    pub group: Option<String>,
    pub name: String,
    pub version: String,
    pub full_name: String,
    pub external_url: String,
    pub status: ServiceStatus,
    pub configuration: ConfigurationSnapshot,
}

/// A registered service instance. Identity is `(name, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    pub name: String,
    pub id: Uuid,
    pub address: String,
    pub port: u16,
    pub uri: String,
    pub registration_time_utc: u64,
    pub payload: ServiceDetails,
}

impl ServiceInstance {
    /// Build the instance for this process with a freshly generated id.
    pub fn new(config: &ServiceConfig, metadata: &ProjectMetadata, status: ServiceStatus) -> Self {
        let external_url = external_url(config);
        let registration_time_utc = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        Self {
            name: metadata.name.clone(),
            id: Uuid::new_v4(),
            address: config.server.host.clone(),
            port: config.server.http_port,
            uri: external_url.clone(),
            registration_time_utc,
            payload: ServiceDetails {
                group: metadata.group.clone(),
                name: metadata.name.clone(),
                version: metadata.version.clone(),
                full_name: metadata.full_name(),
                external_url,
                status,
                configuration: ConfigurationSnapshot::from(config),
            },
        }
    }

    pub fn status(&self) -> ServiceStatus {
        self.payload.status
    }

    pub fn set_status(&mut self, status: ServiceStatus) {
        self.payload.status = status;
    }

    /// Registry key relative to the namespace: `<name>/<id>`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.name, self.id)
    }
}

/// `http://<host>:<external port or http port>/`
pub fn external_url(config: &ServiceConfig) -> String {
    format!(
        "http://{}:{}/",
        config.server.host,
        config.server.advertised_port()
    )
}
