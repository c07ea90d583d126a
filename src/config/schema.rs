//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service host.
//! All types derive Serde traits for deserialization from config files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the service host.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener ports, timeouts and the stop secret.
    pub server: ServerConfig,

    /// Service registry settings.
    pub discovery: DiscoveryConfig,

    /// Overrides for the metadata published to the registry.
    pub service: ServiceMetadataConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Configuration file of the hosted application.
    pub conf: Option<PathBuf>,
}

impl ServiceConfig {
    /// Path of the hosted application's configuration file.
    ///
    /// Returns the configured `conf` path, falling back to `default`.
    pub fn app_conf_file(&self, default: impl AsRef<Path>) -> PathBuf {
        self.conf
            .clone()
            .unwrap_or_else(|| default.as_ref().to_path_buf())
    }
}

/// Listener configuration shared by the application and admin connectors.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host name advertised in the externally reachable URL.
    pub host: String,

    /// Interface both listeners bind to.
    pub bind_address: String,

    /// Application listener port.
    pub http_port: u16,

    /// Admin listener port.
    pub http_admin_port: u16,

    /// Port advertised instead of `http_port` (e.g. behind a NAT or proxy).
    pub external_port: Option<u16>,

    /// Secret required by the stop endpoint.
    pub stop_secret: String,

    /// Time in-flight requests get to finish on shutdown, in milliseconds.
    pub graceful_shutdown_ms: u64,

    /// Connection idle timeout in milliseconds.
    pub idle_timeout_ms: u64,

    /// Maximum size of the request head in bytes.
    pub max_request_header_size: usize,
}

impl ServerConfig {
    pub fn graceful_shutdown(&self) -> Duration {
        Duration::from_millis(self.graceful_shutdown_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Port published to the registry.
    pub fn advertised_port(&self) -> u16 {
        self.external_port.unwrap_or(self.http_port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            bind_address: "0.0.0.0".to_string(),
            http_port: 8080,
            http_admin_port: 8081,
            external_port: None,
            stop_secret: String::new(),
            graceful_shutdown_ms: 1000,
            idle_timeout_ms: 30_000,
            max_request_header_size: 8192, // 8 KiB
        }
    }
}

/// Service registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Register this instance in the registry.
    pub enabled: bool,

    /// Registry address (e.g., "127.0.0.1:8500" or "http://consul:8500").
    pub connect_string: String,

    /// Namespace path the instance is published under.
    pub namespace: String,

    /// Initial backoff between registry retries in milliseconds.
    pub retry_base_delay_ms: u64,

    /// Retries after the first failed registry call.
    pub max_retries: u32,

    /// Upper bound for a single backoff in milliseconds.
    pub retry_max_delay_ms: u64,

    /// Timeout of a single registry request in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            connect_string: "127.0.0.1:8500".to_string(),
            namespace: "services".to_string(),
            retry_base_delay_ms: 1000,
            max_retries: 3,
            retry_max_delay_ms: 30_000,
            request_timeout_ms: 5000,
        }
    }
}

/// Registry metadata overrides. Unset fields fall back to the package metadata.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceMetadataConfig {
    pub group: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Install the Prometheus recorder and expose `/metrics` on the admin listener.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
        }
    }
}
