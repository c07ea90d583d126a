//! Shutdown coordination.
//!
//! Every path that wants the process gone (the admin stop endpoint, OS
//! signals, the end of `main`) goes through one [`ShutdownCoordinator`]. A
//! one-shot flag guarantees the server is stopped at most once; later callers
//! wait for that stop to finish and then return quietly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::http::server::{ServerError, ServerRef};

/// Final step of a requested shutdown, called with the exit code.
pub type ExitHook = Arc<dyn Fn(i32) + Send + Sync>;

fn process_exit() -> ExitHook {
    Arc::new(|code: i32| {
        std::process::exit(code);
    })
}

#[derive(Clone)]
pub struct ShutdownCoordinator {
    server: ServerRef,
    triggered: Arc<AtomicBool>,
    exit: ExitHook,
}

impl ShutdownCoordinator {
    pub fn new(server: ServerRef) -> Self {
        Self::with_exit_hook(server, process_exit())
    }

    pub fn with_exit_hook(server: ServerRef, exit: ExitHook) -> Self {
        Self {
            server,
            triggered: Arc::new(AtomicBool::new(false)),
            exit,
        }
    }

    /// Whether a shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Stop the server unless another caller already did.
    ///
    /// Returns `Ok(true)` only for the call that actually stopped the server.
    /// Repeat callers wait for the first stop to complete and get `Ok(false)`.
    pub async fn request_shutdown(&self) -> Result<bool, ServerError> {
        let Some(server) = self.server.upgrade() else {
            return Ok(false);
        };

        if self
            .triggered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Shutdown already requested, waiting for it to complete");
            server.join().await;
            return Ok(false);
        }

        if !(server.is_started() || server.is_running()) {
            tracing::info!(state = %server.state(), "Server not running, nothing to stop");
            return Ok(false);
        }

        tracing::info!("Shutdown requested, stopping server");
        server.stop().await?;
        Ok(true)
    }

    /// Stop the server, then terminate the process through the exit hook.
    pub async fn shutdown_and_exit(&self) {
        let code = match self.request_shutdown().await {
            Ok(_) => 0,
            Err(e) => {
                tracing::error!(error = %e, "Error stopping server");
                1
            }
        };
        tracing::info!(code, "Exiting");
        (self.exit)(code);
    }
}
