//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ServerConfig
//!     → connector.rs (one descriptor per role: application, admin)
//!     → listener.rs (bind, accept loop, hyper connection serving)
//!     → Hand off to the connector's axum Router
//!
//! Listener States:
//!     Bound → Accepting → Draining → Closed
//! ```
//!
//! # Design Decisions
//! - Each role binds its own socket, so routes never leak across roles
//! - The admin listener runs on its own bounded runtime
//! - Draining is bounded by the graceful-shutdown timeout

pub mod connector;
pub mod listener;

pub use connector::{Connector, ADMIN, APPLICATION};
pub use listener::{spawn_listener, ListenerError, ListenerHandle};
