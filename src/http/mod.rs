//! HTTP server subsystem.
//!
//! # Data Flow
//! ```text
//! ServiceConfig + hosted application Router
//!     → factory.rs (connectors, routing table, discovery listener)
//!     → server.rs (start: bind listeners; stop: drain; lifecycle events)
//!     → net::listener (one accept loop per connector)
//! ```

pub mod factory;
pub mod server;

pub use factory::ServerFactory;
pub use server::{Server, ServerBuilder, ServerError, ServerRef, ServerState};
