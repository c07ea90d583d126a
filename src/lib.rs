//! Service host library.
//!
//! Hosts an axum application behind two listeners (application and admin),
//! stops it through an authenticated admin endpoint or OS signals, and keeps
//! it registered in a service registry while it runs.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;

// Control plane
pub mod admin;
pub mod discovery;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ServiceConfig;
pub use http::{Server, ServerFactory};
pub use lifecycle::ShutdownCoordinator;
