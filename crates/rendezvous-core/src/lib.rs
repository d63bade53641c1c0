//! Rendezvous Core - registry-mediated RPC over line-delimited JSON.
//!
//! A registry process maps function names to `host:port` endpoints. Callees
//! announce the names they host; callers look a name up and then call the
//! callee directly. Neither side hard-codes the other's location.
//!
//! # Example
//!
//! ```rust,ignore
//! use rendezvous_core::{Endpoint, RegistryClient, RpcClient, RpcServer, ServerConfig};
//! use std::sync::Arc;
//!
//! struct Lamp;
//!
//! impl Lamp {
//!     fn toggle(&self) -> String { "ON".to_string() }
//! }
//!
//! #[tokio::main]
//! async fn main() -> rendezvous_core::Result<()> {
//!     let registry = RegistryClient::new(Endpoint::default());
//!
//!     let mut callee = RpcServer::new(ServerConfig::ephemeral(), registry.clone());
//!     callee.start().await?;
//!     callee.register_function("toggle", Arc::new(Lamp), Lamp::toggle).await?;
//!
//!     let caller = RpcClient::new(registry);
//!     let state = caller.invoke("toggle", vec![]).await?;
//!     println!("lamp is {}", state);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod rpc;
pub mod transport;

pub use config::{
    ConnectionLimit, Endpoint, ProtocolConfig, RegistryConfig, ServerConfig, TransportConfig,
};
pub use error::{DispatchError, RendezvousError, Result, RpcPhase};
pub use protocol::{Message, MessageKind, Status};
pub use registry::{RegistrationOutcome, RegistryClient, RegistryServer, ServiceRegistry};
pub use rpc::{FunctionTable, IntoCallResult, Method, RemoteFunction, RpcClient, RpcServer};
pub use transport::{ClientTransport, Connection};
