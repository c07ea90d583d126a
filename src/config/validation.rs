//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, header limits, distinct ports)
//! - Check that discovery has somewhere to register when enabled
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::ServiceConfig;

/// Smallest request head hyper can be configured to buffer.
pub const MIN_REQUEST_HEADER_SIZE: usize = 8192;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("server.host must not be empty")]
    EmptyHost,
    #[error("server.stop_secret must not be empty")]
    EmptyStopSecret,
    #[error("server.http_port and server.http_admin_port must differ (both {0})")]
    PortClash(u16),
    #[error(
        "server.max_request_header_size must be at least {min} bytes (got {0})",
        min = MIN_REQUEST_HEADER_SIZE
    )]
    HeaderSizeTooSmall(usize),
    #[error("server.idle_timeout_ms must be greater than zero")]
    ZeroIdleTimeout,
    #[error("discovery.connect_string must not be empty when discovery is enabled")]
    EmptyConnectString,
    #[error("discovery.namespace must not be empty when discovery is enabled")]
    EmptyNamespace,
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let server = &config.server;

    if server.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    }
    if server.stop_secret.is_empty() {
        errors.push(ValidationError::EmptyStopSecret);
    }
    // Port 0 asks the OS for an ephemeral port, so two zeros never clash.
    if server.http_port != 0 && server.http_port == server.http_admin_port {
        errors.push(ValidationError::PortClash(server.http_port));
    }
    if server.max_request_header_size < MIN_REQUEST_HEADER_SIZE {
        errors.push(ValidationError::HeaderSizeTooSmall(
            server.max_request_header_size,
        ));
    }
    if server.idle_timeout_ms == 0 {
        errors.push(ValidationError::ZeroIdleTimeout);
    }

    if config.discovery.enabled {
        if config.discovery.connect_string.trim().is_empty() {
            errors.push(ValidationError::EmptyConnectString);
        }
        if config.discovery.namespace.trim_matches('/').is_empty() {
            errors.push(ValidationError::EmptyNamespace);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
