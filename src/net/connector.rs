//! Listener descriptors for the two logical roles.
//!
//! # Responsibilities
//! - Map configuration onto one descriptor per role (application, admin)
//! - Carry the per-listener idle timeout and request header limit
//! - Size the dedicated admin worker pool from CPU parallelism

use std::fmt;
use std::thread;
use std::time::Duration;

use crate::config::ServerConfig;

/// Name of the listener serving the hosted application.
pub const APPLICATION: &str = "application";
/// Name of the listener serving control and metrics endpoints.
pub const ADMIN: &str = "admin";

/// Describes one network listener before it is bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connector {
    pub name: &'static str,
    pub bind_address: String,
    pub port: u16,
    pub idle_timeout: Duration,
    pub max_request_header_size: usize,
    /// Dedicated worker threads. `None` serves on the hosting runtime.
    pub worker_threads: Option<usize>,
}

impl Connector {
    pub fn application(config: &ServerConfig) -> Self {
        Self::with_port(APPLICATION, config, config.http_port)
    }

    /// The admin listener always owns a bounded pool so control requests
    /// never queue behind application traffic.
    pub fn admin(config: &ServerConfig) -> Self {
        Self {
            worker_threads: Some(admin_pool_size()),
            ..Self::with_port(ADMIN, config, config.http_admin_port)
        }
    }

    fn with_port(name: &'static str, config: &ServerConfig, port: u16) -> Self {
        Self {
            name,
            bind_address: config.bind_address.clone(),
            port,
            idle_timeout: config.idle_timeout(),
            max_request_header_size: config.max_request_header_size,
            worker_threads: None,
        }
    }

    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address())
    }
}

/// Admin worker pool size for this host.
pub fn admin_pool_size() -> usize {
    let cpus = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    pool_size_for(cpus)
}

/// `max(1, (cpus + 3) / 4)`
pub fn pool_size_for(cpus: usize) -> usize {
    ((cpus + 3) / 4).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_size_formula() {
        assert_eq!(pool_size_for(0), 1);
        assert_eq!(pool_size_for(1), 1);
        assert_eq!(pool_size_for(4), 1);
        assert_eq!(pool_size_for(5), 2);
        assert_eq!(pool_size_for(8), 2);
        assert_eq!(pool_size_for(9), 3);
        assert_eq!(pool_size_for(64), 16);
    }

    #[test]
    fn roles_get_their_own_ports() {
        let config = ServerConfig {
            http_port: 9000,
            http_admin_port: 9001,
            ..ServerConfig::default()
        };

        let app = Connector::application(&config);
        let admin = Connector::admin(&config);

        assert_eq!(app.name, APPLICATION);
        assert_eq!(app.address(), "0.0.0.0:9000");
        assert_eq!(app.worker_threads, None);
        assert_eq!(admin.name, ADMIN);
        assert_eq!(admin.address(), "0.0.0.0:9001");
        assert_eq!(admin.worker_threads, Some(admin_pool_size()));
    }

    #[test]
    fn limits_come_from_config() {
        let config = ServerConfig::default();
        for connector in [Connector::application(&config), Connector::admin(&config)] {
            assert_eq!(connector.idle_timeout, Duration::from_millis(30_000));
            assert_eq!(connector.max_request_header_size, 8192);
        }
    }
}
