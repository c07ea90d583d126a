//! Accept and serve loop for one listener.
//!
//! # Responsibilities
//! - Bind the connector's address
//! - Accept connections and serve them with hyper (HTTP/1.1 and HTTP/2)
//! - Enforce the header size limit and idle timeout per connection
//! - On shutdown: stop accepting, drain in-flight connections, force the rest
//! - Run on a dedicated runtime when the connector owns a worker pool

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinSet;

use crate::config::validation::MIN_REQUEST_HEADER_SIZE;
use crate::net::connector::Connector;

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to accept: {0}")]
    Accept(#[source] io::Error),
    #[error("Listener runtime error: {0}")]
    Runtime(#[source] io::Error),
    #[error(
        "Request header limit of {0} bytes is below the minimum of {min} bytes",
        min = MIN_REQUEST_HEADER_SIZE
    )]
    HeaderLimit(usize),
}

/// Per-connection settings derived from the connector.
#[derive(Debug, Clone, Copy)]
struct ServeSettings {
    idle_timeout: Duration,
    max_request_header_size: usize,
    graceful_shutdown: Duration,
}

/// A bound, serving listener.
pub struct ListenerHandle {
    name: &'static str,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    done: oneshot::Receiver<Result<(), ListenerError>>,
}

impl ListenerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Split into the shutdown trigger and the completion future.
    pub fn into_parts(
        self,
    ) -> (
        watch::Sender<bool>,
        impl std::future::Future<Output = Result<(), ListenerError>>,
    ) {
        let done = self.done;
        let finished = async move {
            done.await
                .unwrap_or_else(|_| Err(ListenerError::Runtime(io::Error::other("listener task vanished"))))
        };
        (self.shutdown, finished)
    }
}

/// Bind `connector` and start serving `router` on it.
///
/// Returns once the socket is bound and accepting. Connectors with a worker
/// pool get their own multi-thread runtime on a dedicated OS thread.
pub async fn spawn_listener(
    connector: &Connector,
    router: Router,
    graceful_shutdown: Duration,
) -> Result<ListenerHandle, ListenerError> {
    if connector.max_request_header_size < MIN_REQUEST_HEADER_SIZE {
        return Err(ListenerError::HeaderLimit(connector.max_request_header_size));
    }

    let addr = connector.address();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ListenerError::Bind { addr: addr.clone(), source })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| ListenerError::Bind { addr, source })?;

    let settings = ServeSettings {
        idle_timeout: connector.idle_timeout,
        max_request_header_size: connector.max_request_header_size,
        graceful_shutdown,
    };
    let name = connector.name;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (done_tx, done_rx) = oneshot::channel();

    match connector.worker_threads {
        None => {
            tokio::spawn(async move {
                let result = serve(name, listener, router, settings, shutdown_rx).await;
                let _ = done_tx.send(result);
            });
        }
        Some(threads) => {
            let listener = listener.into_std().map_err(ListenerError::Runtime)?;
            let (ready_tx, ready_rx) = oneshot::channel::<io::Result<()>>();

            std::thread::Builder::new()
                .name(format!("{name}-listener"))
                .spawn(move || {
                    let runtime = tokio::runtime::Builder::new_multi_thread()
                        .worker_threads(threads)
                        .thread_name(format!("{name}-worker"))
                        .enable_all()
                        .build();
                    let runtime = match runtime {
                        Ok(runtime) => runtime,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let result = runtime.block_on(async move {
                        let listener = match TcpListener::from_std(listener) {
                            Ok(listener) => listener,
                            Err(e) => {
                                let _ = ready_tx.send(Err(e));
                                return Ok(());
                            }
                        };
                        let _ = ready_tx.send(Ok(()));
                        serve(name, listener, router, settings, shutdown_rx).await
                    });
                    let _ = done_tx.send(result);
                })
                .map_err(ListenerError::Runtime)?;

            ready_rx
                .await
                .unwrap_or_else(|_| Err(io::Error::other("listener runtime exited during startup")))
                .map_err(ListenerError::Runtime)?;
        }
    }

    tracing::info!(
        listener = name,
        address = %local_addr,
        worker_threads = ?connector.worker_threads,
        "Listener bound"
    );

    Ok(ListenerHandle {
        name,
        local_addr,
        shutdown: shutdown_tx,
        done: done_rx,
    })
}

async fn serve(
    name: &'static str,
    listener: TcpListener,
    router: Router,
    settings: ServeSettings,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ListenerError> {
    let mut builder = auto::Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(settings.idle_timeout)
        .max_buf_size(settings.max_request_header_size);
    builder
        .http2()
        .timer(TokioTimer::new())
        .max_header_list_size(u32::try_from(settings.max_request_header_size).unwrap_or(u32::MAX));

    let graceful = GracefulShutdown::new();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) if is_connection_error(&e) => {
                        tracing::debug!(listener = name, error = %e, "Connection error during accept");
                        continue;
                    }
                    Err(e) => return Err(ListenerError::Accept(e)),
                };
                tracing::trace!(listener = name, peer_addr = %peer_addr, "Connection accepted");

                let builder = builder.clone();
                let service = TowerToHyperService::new(router.clone());
                let watcher = graceful.watcher();
                let mut stopping = shutdown.clone();
                let idle_timeout = settings.idle_timeout;
                connections.spawn(async move {
                    // Protocol detection reads the first bytes without a timer.
                    let mut first = [0u8; 1];
                    tokio::select! {
                        peeked = tokio::time::timeout(idle_timeout, stream.peek(&mut first)) => match peeked {
                            Ok(Ok(n)) if n > 0 => {}
                            Ok(Ok(_)) => return,
                            Ok(Err(e)) => {
                                tracing::debug!(peer_addr = %peer_addr, error = %e, "Connection failed before first request");
                                return;
                            }
                            Err(_) => {
                                tracing::debug!(peer_addr = %peer_addr, "Connection idle before first request, closing");
                                return;
                            }
                        },
                        _ = stopping.changed() => return,
                    }

                    let conn = builder.serve_connection(TokioIo::new(stream), service);
                    if let Err(e) = watcher.watch(conn).await {
                        tracing::debug!(peer_addr = %peer_addr, error = %e, "Connection closed with error");
                    }
                });
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = shutdown.changed() => break,
        }
    }

    drop(listener);
    tracing::info!(
        listener = name,
        in_flight = connections.len(),
        "Listener stopped accepting, draining connections"
    );

    if tokio::time::timeout(settings.graceful_shutdown, graceful.shutdown())
        .await
        .is_err()
    {
        tracing::warn!(
            listener = name,
            remaining = connections.len(),
            "Graceful shutdown timed out, closing remaining connections"
        );
        connections.abort_all();
    }
    while connections.join_next().await.is_some() {}

    tracing::info!(listener = name, "Listener closed");
    Ok(())
}

/// Errors tied to a single connection; the listener itself is fine.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}
