//! Remote stop endpoint.
//!
//! `/stop?secret=...` (or a form-encoded POST body carrying `secret`) on the
//! admin listener. An authorized request is answered with 202 and the stop
//! runs only after the response body has been handed to the connection, on
//! a dedicated worker thread outside the admin request pool. Stopping drains
//! the admin listener itself, so the stop can never run on the thread that
//! is still writing the acknowledgement.

use std::convert::Infallible;
use std::io;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::future::{self, BoxFuture};
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::lifecycle::shutdown::ShutdownCoordinator;
use crate::observability::metrics;

pub const STOP_PATH: &str = "/stop";

const MAX_FORM_BODY: usize = 16 * 1024;
const ACCEPTED_BODY: &str = "Shutdown accepted\n";

#[derive(Error, Debug)]
pub enum StopError {
    #[error("Failed to read request body: {0}")]
    Body(#[source] axum::Error),
    #[error("Stop worker unavailable: {0}")]
    Worker(#[source] io::Error),
}

#[derive(Deserialize)]
struct StopParams {
    secret: Option<String>,
}

#[derive(Clone)]
pub struct StopHandler {
    secret: Arc<str>,
    coordinator: ShutdownCoordinator,
    worker: StopWorker,
}

impl StopHandler {
    pub fn new(secret: impl Into<Arc<str>>, coordinator: ShutdownCoordinator) -> Self {
        Self {
            secret: secret.into(),
            coordinator,
            worker: StopWorker::default(),
        }
    }

    async fn handle(&self, request: Request<Body>) -> Result<Response, StopError> {
        let secret = secret_param(request).await?;
        // An unset secret never authorizes anything.
        let authorized = !self.secret.is_empty() && secret.as_deref() == Some(&*self.secret);
        if !authorized {
            tracing::warn!(secret_present = secret.is_some(), "Unauthorized stop request");
            metrics::record_stop_request("unauthorized");
            return Ok(StatusCode::UNAUTHORIZED.into_response());
        }

        let (sent_tx, sent_rx) = oneshot::channel::<()>();
        let coordinator = self.coordinator.clone();
        self.worker
            .submit(Box::pin(async move {
                // A dropped sender means the client went away; stop regardless.
                let _ = sent_rx.await;
                coordinator.shutdown_and_exit().await;
            }))
            .await?;

        tracing::info!("Stop request accepted");
        metrics::record_stop_request("accepted");
        Ok((StatusCode::ACCEPTED, notify_when_sent(ACCEPTED_BODY, sent_tx)).into_response())
    }
}

/// Runs in front of every admin route; only the stop path is handled here.
pub async fn stop_middleware(
    State(handler): State<StopHandler>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.uri().path() != STOP_PATH {
        return next.run(request).await;
    }

    match handler.handle(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Stop request failed");
            metrics::record_stop_request("error");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `secret` from the query string, else from a form-encoded POST body.
async fn secret_param(request: Request<Body>) -> Result<Option<String>, StopError> {
    if let Some(secret) = request
        .uri()
        .query()
        .and_then(|query| serde_urlencoded::from_str::<StopParams>(query).ok())
        .and_then(|params| params.secret)
    {
        return Ok(Some(secret));
    }

    if request.method() != Method::POST {
        return Ok(None);
    }
    let body = axum::body::to_bytes(request.into_body(), MAX_FORM_BODY)
        .await
        .map_err(StopError::Body)?;
    Ok(serde_urlencoded::from_bytes::<StopParams>(&body)
        .ok()
        .and_then(|params| params.secret))
}

/// Body that yields `text` and then fires `sent` once the connection asks
/// for the next frame, i.e. after `text` has been written.
fn notify_when_sent(text: &'static str, sent: oneshot::Sender<()>) -> Body {
    let chunk = stream::once(future::ready(Ok::<_, Infallible>(Bytes::from_static(
        text.as_bytes(),
    ))));
    let done = stream::once(async move {
        let _ = sent.send(());
    })
    .filter_map(|()| future::ready(None::<Result<Bytes, Infallible>>));
    Body::from_stream(chunk.chain(done))
}

type Job = BoxFuture<'static, ()>;

/// Single-threaded executor for stop jobs, started on first use.
///
/// Jobs run one after another on their own OS thread and runtime, so a stop
/// never competes with the request pools it is about to drain.
#[derive(Clone, Default)]
struct StopWorker {
    jobs: Arc<Mutex<Option<mpsc::UnboundedSender<Job>>>>,
}

impl StopWorker {
    async fn submit(&self, job: Job) -> Result<(), StopError> {
        let mut jobs = self.jobs.lock().await;
        let job = match jobs.as_ref() {
            Some(tx) => match tx.send(job) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        let tx = spawn_worker().await.map_err(StopError::Worker)?;
        tx.send(job)
            .map_err(|_| StopError::Worker(io::Error::other("stop worker exited")))?;
        *jobs = Some(tx);
        Ok(())
    }
}

async fn spawn_worker() -> io::Result<mpsc::UnboundedSender<Job>> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
    let (ready_tx, ready_rx) = oneshot::channel::<io::Result<()>>();

    std::thread::Builder::new()
        .name("stop-worker".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));
            runtime.block_on(async move {
                while let Some(job) = rx.recv().await {
                    job.await;
                }
            });
        })?;

    ready_rx
        .await
        .unwrap_or_else(|_| Err(io::Error::other("stop worker exited during startup")))?;
    tracing::debug!("Stop worker started");
    Ok(tx)
}
