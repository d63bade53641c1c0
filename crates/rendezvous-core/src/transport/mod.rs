//! TCP transport for newline-delimited JSON frames.
//!
//! # Architecture
//!
//! - **Client**: [`ClientTransport`] opens one fresh [`Connection`] per exchange
//! - **Server**: [`ServerTransport`] accepts connections and hands each to a
//!   [`ConnectionHandler`] on its own task
//! - **Connection**: shared framing used by both sides
//!
//! Connections are never reused: the initiator closes after reading its
//! response, the acceptor after writing it.

pub mod client;
pub mod connection;
pub mod server;

pub use client::ClientTransport;
pub use connection::{read_frame, write_frame, Connection};
pub use server::{ConnectionHandler, ServerHandle, ServerTransport};
