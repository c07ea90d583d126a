//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Events (events.rs):
//!     Server transitions → LifecycleEvent → registered LifecycleListeners
//!
//! Startup (startup.rs):
//!     Config → Build server → Hook signals → Start → Join
//!
//! Shutdown (shutdown.rs):
//!     /stop, SIGTERM/SIGINT, end of main → ShutdownCoordinator (once)
//!     → Stop accepting → Drain connections → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: listeners see `starting` before any socket is bound
//! - Ordered shutdown: stop accept, drain, deregister, exit
//! - Shutdown has timeout: connections forced closed after the graceful window

pub mod events;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use events::{LifecycleEvent, LifecycleListener};
pub use shutdown::{ExitHook, ShutdownCoordinator};
pub use startup::{run, run_with, StartupError};
