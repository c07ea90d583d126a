//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Assembly time:
//!     hosted application Router → (application, "/")
//!     admin Router (stop handler + metrics) → (admin, "/")
//!     → table.rs (RoutingTable of RouteContexts)
//!
//! Start time:
//!     RoutingTable::router_for(connector name)
//!     → merged/nested axum Router for that listener only
//! ```
//!
//! # Design Decisions
//! - Routes are fixed at assembly, immutable at runtime
//! - Isolation is structural: a context belongs to exactly one listener

pub mod table;

pub use table::{RouteContext, RoutingTable};
