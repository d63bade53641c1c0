//! Centralized configuration for rendezvous.
//!
//! Protocol constants, default endpoints, transport timeouts and the
//! listening-server policy.

use std::fmt;
use std::time::Duration;

/// Wire protocol configuration.
pub struct ProtocolConfig;

impl ProtocolConfig {
    /// Version tag carried by every envelope.
    pub const VERSION: &'static str = "1.0";
}

/// Registry defaults.
pub struct RegistryConfig;

impl RegistryConfig {
    pub const DEFAULT_HOST: &'static str = "localhost";
    pub const DEFAULT_PORT: u16 = 7777;
}

/// Transport timeouts and limits.
pub struct TransportConfig;

impl TransportConfig {
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    /// Read timeout for client-initiated connections.
    pub const READ_TIMEOUT: Duration = Duration::from_secs(5);
    pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024; // 16MB
}

/// A `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(RegistryConfig::DEFAULT_HOST, RegistryConfig::DEFAULT_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// How many connections a listening server handles at once.
///
/// `Unbounded` spawns one worker per accepted connection with no queue and no
/// backpressure, so a hostile or buggy client can exhaust memory and file
/// descriptors. It is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionLimit {
    #[default]
    Unbounded,
    /// Connections beyond this many in flight are logged and dropped.
    Max(usize),
}

impl ConnectionLimit {
    pub fn admits(&self, active: usize) -> bool {
        match self {
            ConnectionLimit::Unbounded => true,
            ConnectionLimit::Max(max) => active < *max,
        }
    }
}

/// Listening-side configuration shared by the registry and callees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind; 0 lets the OS choose.
    pub port: u16,
    pub max_connections: ConnectionLimit,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            max_connections: ConnectionLimit::default(),
        }
    }

    /// Bind `localhost` on an OS-assigned port.
    pub fn ephemeral() -> Self {
        Self::new(RegistryConfig::DEFAULT_HOST, 0)
    }

    pub fn with_max_connections(mut self, limit: ConnectionLimit) -> Self {
        self.max_connections = limit;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(RegistryConfig::DEFAULT_HOST, RegistryConfig::DEFAULT_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_display() {
        assert_eq!(Endpoint::new("10.0.0.2", 9000).to_string(), "10.0.0.2:9000");
        assert_eq!(Endpoint::default().to_string(), "localhost:7777");
    }

    #[test]
    fn test_connection_limit() {
        assert!(ConnectionLimit::Unbounded.admits(usize::MAX - 1));
        assert!(ConnectionLimit::Max(2).admits(1));
        assert!(!ConnectionLimit::Max(2).admits(2));
    }

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 7777);
        assert_eq!(config.max_connections, ConnectionLimit::Unbounded);
        assert_eq!(ServerConfig::ephemeral().port, 0);
    }
}
