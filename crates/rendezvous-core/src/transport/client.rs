//! Outbound connections.

use super::connection::Connection;
use crate::config::{Endpoint, TransportConfig};
use crate::{RendezvousError, Result};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, error};

/// Opens fresh connections; one per request/response exchange, never pooled.
#[derive(Debug, Clone, Copy)]
pub struct ClientTransport {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl Default for ClientTransport {
    fn default() -> Self {
        Self {
            connect_timeout: TransportConfig::CONNECT_TIMEOUT,
            read_timeout: TransportConfig::READ_TIMEOUT,
        }
    }
}

impl ClientTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `timeout` both for establishing the connection and for each read.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            connect_timeout: timeout,
            read_timeout: timeout,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Connect to `host:port`.
    pub async fn connect(&self, host: &str, port: u16) -> Result<Connection> {
        let target = Endpoint::new(host, port);
        debug!(
            "Connecting to {} (timeout: {:?})",
            target, self.connect_timeout
        );

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                error!("Timed out connecting to {}", target);
                RendezvousError::Connection {
                    message: format!(
                        "Timed out connecting to {} after {:?}",
                        target, self.connect_timeout
                    ),
                    source: None,
                }
            })?
            .map_err(|e| {
                error!("Failed to connect to {}: {}", target, e);
                RendezvousError::connection_to(&target, e)
            })?;

        Connection::outbound(stream, self.read_timeout)
    }

    pub async fn connect_to(&self, endpoint: &Endpoint) -> Result<Connection> {
        self.connect(&endpoint.host, endpoint.port).await
    }
}
