//! Consul KV registry client.
//!
//! Instances are stored as JSON documents under
//! `/v1/kv/<namespace>/<name>/<id>`. The connect string is a comma separated
//! list of agents (`host:port` or full URLs); the first agent reporting a
//! leader is used for the lifetime of the connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use url::Url;

use crate::config::DiscoveryConfig;
use crate::discovery::instance::ServiceInstance;
use crate::discovery::registry::{RegistryConnection, RegistryConnector, RegistryError};

/// Connector for a Consul cluster.
#[derive(Debug, Clone)]
pub struct ConsulRegistry {
    connect_string: String,
    namespace: String,
    request_timeout: Duration,
}

impl ConsulRegistry {
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            connect_string: config.connect_string.clone(),
            namespace: config.namespace.trim_matches('/').to_string(),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    fn endpoints(&self) -> Result<Vec<Url>, RegistryError> {
        let endpoints = self
            .connect_string
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_endpoint)
            .collect::<Result<Vec<_>, _>>()?;

        if endpoints.is_empty() {
            return Err(RegistryError::InvalidConnectString(
                self.connect_string.clone(),
            ));
        }
        Ok(endpoints)
    }
}

fn parse_endpoint(raw: &str) -> Result<Url, RegistryError> {
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };
    let mut url =
        Url::parse(&candidate).map_err(|_| RegistryError::InvalidConnectString(raw.to_string()))?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(RegistryError::InvalidConnectString(raw.to_string()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[async_trait]
impl RegistryConnector for ConsulRegistry {
    async fn connect(&self) -> Result<Box<dyn RegistryConnection>, RegistryError> {
        let endpoints = self.endpoints()?;
        let client = Client::builder().timeout(self.request_timeout).build()?;

        let mut last_error = None;
        for base in endpoints {
            match leader(&client, &base).await {
                Ok(leader) => {
                    tracing::info!(agent = %base, leader = %leader, "Connected to Consul");
                    return Ok(Box::new(ConsulConnection {
                        client,
                        base,
                        namespace: self.namespace.clone(),
                        closed: AtomicBool::new(false),
                    }));
                }
                Err(e) => {
                    tracing::warn!(agent = %base, error = %e, "Consul agent not usable");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| RegistryError::Unavailable(self.connect_string.clone())))
    }
}

async fn leader(client: &Client, base: &Url) -> Result<String, RegistryError> {
    let url = base
        .join("v1/status/leader")
        .map_err(|_| RegistryError::InvalidConnectString(base.to_string()))?;
    let response = check(client.get(url).send().await?).await?;
    let leader: String = response.json().await?;
    if leader.is_empty() {
        return Err(RegistryError::Unavailable(format!("{} has no leader", base)));
    }
    Ok(leader)
}

async fn check(response: Response) -> Result<Response, RegistryError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        Err(RegistryError::Status { status, message })
    }
}

/// An open connection to one Consul agent.
pub struct ConsulConnection {
    client: Client,
    base: Url,
    namespace: String,
    closed: AtomicBool,
}

impl ConsulConnection {
    fn kv_url(&self, instance: &ServiceInstance) -> Result<Url, RegistryError> {
        let path = if self.namespace.is_empty() {
            format!("v1/kv/{}", instance.key())
        } else {
            format!("v1/kv/{}/{}", self.namespace, instance.key())
        };
        self.base
            .join(&path)
            .map_err(|_| RegistryError::InvalidConnectString(self.base.to_string()))
    }

    fn ensure_open(&self) -> Result<(), RegistryError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(RegistryError::Closed)
        } else {
            Ok(())
        }
    }

    async fn put(&self, instance: &ServiceInstance) -> Result<(), RegistryError> {
        self.ensure_open()?;
        let body = serde_json::to_vec(instance)?;
        let response = self
            .client
            .put(self.kv_url(instance)?)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl RegistryConnection for ConsulConnection {
    async fn register(&self, instance: &ServiceInstance) -> Result<(), RegistryError> {
        self.put(instance).await
    }

    async fn update(&self, instance: &ServiceInstance) -> Result<(), RegistryError> {
        self.put(instance).await
    }

    async fn unregister(&self, instance: &ServiceInstance) -> Result<(), RegistryError> {
        self.ensure_open()?;
        let response = self.client.delete(self.kv_url(instance)?).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            // Already gone, that's fine
            return Ok(());
        }
        check(response).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), RegistryError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(RegistryError::Closed);
        }
        tracing::debug!(agent = %self.base, "Consul connection closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(connect_string: &str) -> ConsulRegistry {
        ConsulRegistry::new(&DiscoveryConfig {
            connect_string: connect_string.into(),
            namespace: "/acme/services/".into(),
            ..DiscoveryConfig::default()
        })
    }

    #[test]
    fn connect_string_without_scheme_defaults_to_http() {
        let endpoints = registry("consul-1:8500, https://consul-2:8501/api").endpoints().unwrap();
        assert_eq!(endpoints[0].as_str(), "http://consul-1:8500/");
        assert_eq!(endpoints[1].as_str(), "https://consul-2:8501/api/");
    }

    #[test]
    fn empty_connect_string_is_invalid() {
        assert!(matches!(
            registry(" , ").endpoints(),
            Err(RegistryError::InvalidConnectString(_))
        ));
    }

    #[test]
    fn namespace_is_trimmed() {
        assert_eq!(registry("localhost:8500").namespace, "acme/services");
    }

    #[tokio::test]
    async fn unreachable_agent_is_transient() {
        use crate::resilience::Retryable;

        // Nothing listens on the discard port.
        let err = match registry("127.0.0.1:9").connect().await {
            Ok(_) => panic!("connect should fail"),
            Err(e) => e,
        };
        assert!(err.is_transient(), "unexpected error: {err}");
    }

    mod agent {
        use super::*;
        use crate::config::ServiceConfig;
        use crate::discovery::instance::ServiceStatus;
        use crate::discovery::metadata::ProjectMetadata;
        use crate::resilience::Retryable;
        use axum::body::Bytes;
        use axum::extract::State;
        use axum::http::{Method, Uri};
        use axum::Router;
        use std::net::SocketAddr;
        use std::sync::{Arc, Mutex};

        /// In-process stand-in for a Consul agent that records every request.
        struct FakeAgent {
            leader: String,
            put_status: StatusCode,
            delete_status: StatusCode,
            requests: Vec<(Method, String, Bytes)>,
        }

        type Shared = Arc<Mutex<FakeAgent>>;

        async fn handle(
            State(agent): State<Shared>,
            method: Method,
            uri: Uri,
            body: Bytes,
        ) -> (StatusCode, String) {
            let mut agent = agent.lock().unwrap();
            agent.requests.push((method.clone(), uri.path().to_string(), body));
            if uri.path() == "/v1/status/leader" {
                return (StatusCode::OK, serde_json::to_string(&agent.leader).unwrap());
            }
            if method == Method::DELETE {
                (agent.delete_status, "true".into())
            } else {
                (agent.put_status, "true".into())
            }
        }

        async fn start_agent() -> (SocketAddr, Shared) {
            let agent = Arc::new(Mutex::new(FakeAgent {
                leader: "10.0.0.1:8300".into(),
                put_status: StatusCode::OK,
                delete_status: StatusCode::OK,
                requests: Vec::new(),
            }));
            let router = Router::new().fallback(handle).with_state(Arc::clone(&agent));
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
            (addr, agent)
        }

        fn instance() -> ServiceInstance {
            ServiceInstance::new(
                &ServiceConfig::default(),
                &ProjectMetadata::default(),
                ServiceStatus::Starting,
            )
        }

        fn requests(agent: &Shared) -> Vec<(Method, String, Bytes)> {
            agent.lock().unwrap().requests.clone()
        }

        #[tokio::test]
        async fn publishes_and_removes_the_instance_document() {
            let (addr, agent) = start_agent().await;
            let connection = registry(&addr.to_string()).connect().await.unwrap();
            let mut instance = instance();
            let key = format!("/v1/kv/acme/services/{}/{}", instance.name, instance.id);

            connection.register(&instance).await.unwrap();
            instance.set_status(ServiceStatus::Running);
            connection.update(&instance).await.unwrap();
            connection.unregister(&instance).await.unwrap();
            connection.close().await.unwrap();

            let requests = requests(&agent);
            let calls: Vec<_> = requests
                .iter()
                .map(|(method, path, _)| (method.clone(), path.clone()))
                .collect();
            assert_eq!(
                calls,
                [
                    (Method::GET, "/v1/status/leader".to_string()),
                    (Method::PUT, key.clone()),
                    (Method::PUT, key.clone()),
                    (Method::DELETE, key),
                ]
            );

            let registered: ServiceInstance = serde_json::from_slice(&requests[1].2).unwrap();
            assert_eq!(registered.status(), ServiceStatus::Starting);
            assert_eq!(registered.id, instance.id);
            let updated: ServiceInstance = serde_json::from_slice(&requests[2].2).unwrap();
            assert_eq!(updated, instance);
            assert!(requests[3].2.is_empty());
        }

        #[tokio::test]
        async fn agent_without_leader_is_unavailable() {
            let (addr, agent) = start_agent().await;
            agent.lock().unwrap().leader.clear();

            let err = match registry(&addr.to_string()).connect().await {
                Ok(_) => panic!("connect should fail without a leader"),
                Err(e) => e,
            };
            assert!(matches!(err, RegistryError::Unavailable(_)), "unexpected error: {err}");
            assert!(err.is_transient());
        }

        #[tokio::test]
        async fn unregistering_a_missing_instance_succeeds() {
            let (addr, agent) = start_agent().await;
            agent.lock().unwrap().delete_status = StatusCode::NOT_FOUND;
            let connection = registry(&addr.to_string()).connect().await.unwrap();

            connection.unregister(&instance()).await.unwrap();
        }

        #[tokio::test]
        async fn server_errors_are_transient_and_client_errors_are_not() {
            let (addr, agent) = start_agent().await;
            let connection = registry(&addr.to_string()).connect().await.unwrap();

            agent.lock().unwrap().put_status = StatusCode::SERVICE_UNAVAILABLE;
            let err = connection.register(&instance()).await.unwrap_err();
            assert!(matches!(err, RegistryError::Status { status: 503, .. }), "unexpected error: {err}");
            assert!(err.is_transient());

            agent.lock().unwrap().put_status = StatusCode::FORBIDDEN;
            let err = connection.update(&instance()).await.unwrap_err();
            assert!(matches!(err, RegistryError::Status { status: 403, .. }), "unexpected error: {err}");
            assert!(!err.is_transient());

            agent.lock().unwrap().delete_status = StatusCode::INTERNAL_SERVER_ERROR;
            let err = connection.unregister(&instance()).await.unwrap_err();
            assert!(matches!(err, RegistryError::Status { status: 500, .. }), "unexpected error: {err}");
        }

        #[tokio::test]
        async fn closed_connection_rejects_every_call() {
            let (addr, agent) = start_agent().await;
            let connection = registry(&addr.to_string()).connect().await.unwrap();
            connection.close().await.unwrap();
            let instance = instance();

            assert!(matches!(connection.register(&instance).await, Err(RegistryError::Closed)));
            assert!(matches!(connection.update(&instance).await, Err(RegistryError::Closed)));
            assert!(matches!(connection.unregister(&instance).await, Err(RegistryError::Closed)));
            assert!(matches!(connection.close().await, Err(RegistryError::Closed)));
            // Only the leader check reached the agent.
            assert_eq!(requests(&agent).len(), 1);
        }
    }
}
