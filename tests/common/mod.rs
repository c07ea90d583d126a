//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use service_host::config::ServiceConfig;
use service_host::discovery::MemoryRegistry;
use service_host::http::{Server, ServerFactory};
use service_host::lifecycle::ExitHook;
use service_host::resilience::RetryPolicy;
use tokio::sync::mpsc;

pub const SECRET: &str = "s3cret";

/// Loopback config on ephemeral ports with a short graceful window.
pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.server.host = "127.0.0.1".into();
    config.server.bind_address = "127.0.0.1".into();
    config.server.http_port = 0;
    config.server.http_admin_port = 0;
    config.server.stop_secret = SECRET.into();
    config.server.graceful_shutdown_ms = 200;
    config.observability.metrics_enabled = false;
    config
}

/// Exit hook that reports exit codes instead of terminating the test binary.
pub fn exit_hook() -> (ExitHook, mpsc::UnboundedReceiver<i32>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let hook: ExitHook = Arc::new(move |code: i32| {
        let _ = tx.send(code);
    });
    (hook, rx)
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        max_retries: 3,
    }
}

pub fn app() -> Router {
    Router::new().route("/", get(|| async { "hosted" }))
}

pub struct Harness {
    pub server: Server,
    pub exits: mpsc::UnboundedReceiver<i32>,
    pub registry: MemoryRegistry,
}

/// Build (not start) a server backed by an in-memory registry.
pub fn harness(config: &ServiceConfig) -> Harness {
    let registry = MemoryRegistry::new();
    let (hook, exits) = exit_hook();
    let server = ServerFactory::new()
        .with_registry(Arc::new(registry.clone()))
        .with_retry_policy(fast_retry())
        .with_exit_hook(hook)
        .build(config, app());
    Harness {
        server,
        exits,
        registry,
    }
}

pub fn url(server: &Server, connector: &str, path: &str) -> String {
    let addr = server
        .local_addr(connector)
        .unwrap_or_else(|| panic!("{connector} listener not bound"));
    format!("http://{addr}{path}")
}

/// Client without connection pooling, so every request opens a fresh socket.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Wait for the next exit code reported by the hook.
pub async fn next_exit(exits: &mut mpsc::UnboundedReceiver<i32>) -> i32 {
    tokio::time::timeout(Duration::from_secs(5), exits.recv())
        .await
        .expect("no exit within 5s")
        .expect("exit hook dropped")
}

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}
