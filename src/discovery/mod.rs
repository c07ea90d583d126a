//! Service discovery subsystem.
//!
//! # Data Flow
//! ```text
//! Server lifecycle event
//!     → lifecycle.rs (DiscoveryLifecycle state machine)
//!     → registry.rs (RegistryConnector / RegistryConnection traits)
//!     → consul.rs (Consul KV over HTTP) | memory.rs (in-process)
//!
//! Published record:
//!     metadata.rs (group, name, version) + config
//!     → instance.rs (ServiceInstance with ServiceStatus)
//! ```
//!
//! # Design Decisions
//! - Registration precedes traffic: an unreachable registry aborts startup
//! - The registry connection is owned by the lifecycle listener only
//! - Every registry call is retried with bounded exponential backoff

pub mod consul;
pub mod instance;
pub mod lifecycle;
pub mod memory;
pub mod metadata;
pub mod registry;

pub use consul::ConsulRegistry;
pub use instance::{ServiceDetails, ServiceInstance, ServiceStatus};
pub use lifecycle::{DiscoveryError, DiscoveryLifecycle};
pub use memory::{MemoryRegistry, RegistryStats};
pub use metadata::ProjectMetadata;
pub use registry::{RegistryConnection, RegistryConnector, RegistryError};
