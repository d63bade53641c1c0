//! Service registry for function-name discovery.
//!
//! - **ServiceRegistry**: the in-memory name to endpoint table
//! - **RegistryServer**: serves register/lookup requests over the transport
//! - **RegistryClient**: issues those requests from callers and callees
//!
//! The registry is pure discovery. Once a caller has resolved a name it talks
//! to the callee directly. The table is held only in memory and is lost when
//! the registry stops.

pub mod client;
pub mod server;
pub mod service_registry;

pub use client::RegistryClient;
pub use server::RegistryServer;
pub use service_registry::{RegistrationOutcome, ServiceRegistry};
