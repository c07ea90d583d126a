//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to the service registry:
//!     → retries.rs (run, classify failure as transient or permanent)
//!     → On transient failure: backoff.rs (sleep, doubling per attempt)
//!     → Retry ceiling reached: last error returned to the caller
//! ```
//!
//! # Design Decisions
//! - Every registry call has a bounded number of attempts
//! - Jittered backoff prevents thundering herd on registry recovery

pub mod backoff;
pub mod retries;

pub use retries::{RetryPolicy, Retryable};
