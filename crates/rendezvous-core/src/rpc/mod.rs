//! Remote procedure calls on top of the registry.
//!
//! - **RpcServer**: the callee. Hosts a [`FunctionTable`] and announces each
//!   bound name to the registry with its own bound port.
//! - **RpcClient**: the caller. Resolves a name, then calls the callee over a
//!   fresh connection.
//!
//! One connection carries exactly one call.

pub mod client;
pub mod function;
pub mod server;

pub use client::RpcClient;
pub use function::{BoundMethod, FunctionTable, IntoCallResult, Method, RemoteFunction};
pub use server::RpcServer;
