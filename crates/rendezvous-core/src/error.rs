//! Error types for rendezvous.
//!
//! Wire-level faults (malformed payloads, socket failures) are recovered at the
//! accept/dispatch boundary by per-connection handlers. They only reach a human
//! through the registry client and `RpcClient::invoke`, wrapped as
//! [`RendezvousError::Registry`] or [`RendezvousError::Rpc`].

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the rendezvous library.
#[derive(Debug, Error)]
pub enum RendezvousError {
    // Serialization errors
    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Message is missing the 'type' field")]
    MissingTypeField,

    #[error("Expected a '{expected}' message, got '{actual}'")]
    UnexpectedMessageType { expected: String, actual: String },

    // Connection errors
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("No response within {0:?}")]
    ReadTimeout(Duration),

    #[error("Frame exceeds the {limit} byte limit")]
    FrameTooLarge { limit: usize },

    #[error("Failed to decode message from {peer}")]
    InvalidFrame {
        peer: String,
        #[source]
        source: Box<RendezvousError>,
    },

    // Registry errors
    #[error("Registry error: {message}")]
    Registry {
        message: String,
        #[source]
        source: Option<Box<RendezvousError>>,
    },

    // Caller-visible composite
    #[error("{phase} error: {message}")]
    Rpc {
        phase: RpcPhase,
        message: String,
        #[source]
        source: Option<Box<RendezvousError>>,
    },

    // State errors
    #[error("Server has not been started")]
    NotStarted,

    #[error("Server is already started")]
    AlreadyStarted,
}

/// Result type alias for rendezvous operations.
pub type Result<T> = std::result::Result<T, RendezvousError>;

/// Which stage of `invoke` failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcPhase {
    /// Looking the function up in the registry.
    Resolution,
    /// The callee answered with an error status.
    Invocation,
    /// The call connection itself failed.
    Network,
}

impl fmt::Display for RpcPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcPhase::Resolution => write!(f, "Resolution"),
            RpcPhase::Invocation => write!(f, "Invocation"),
            RpcPhase::Network => write!(f, "Network"),
        }
    }
}

impl From<std::io::Error> for RendezvousError {
    fn from(err: std::io::Error) -> Self {
        RendezvousError::Connection {
            message: "I/O failure".to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for RendezvousError {
    fn from(err: serde_json::Error) -> Self {
        RendezvousError::Serialization {
            message: "Invalid JSON".to_string(),
            source: Some(err),
        }
    }
}

impl RendezvousError {
    /// Create a connection error that names the remote endpoint.
    pub fn connection_to(target: impl fmt::Display, err: std::io::Error) -> Self {
        RendezvousError::Connection {
            message: format!("Failed to connect to {}", target),
            source: Some(err),
        }
    }

    /// Wrap a lower-level failure as a registry error.
    pub fn registry(message: impl Into<String>, source: RendezvousError) -> Self {
        RendezvousError::Registry {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Split off the direct cause of a wrapping error.
    ///
    /// The returned error keeps its own message only, so re-wrapping it and
    /// its cause separately never repeats the cause's text.
    pub fn detach_source(self) -> (Self, Option<Box<RendezvousError>>) {
        match self {
            RendezvousError::Registry { message, source } => (
                RendezvousError::Registry {
                    message,
                    source: None,
                },
                source,
            ),
            RendezvousError::Rpc {
                phase,
                message,
                source,
            } => (
                RendezvousError::Rpc {
                    phase,
                    message,
                    source: None,
                },
                source,
            ),
            other => (other, None),
        }
    }

    /// One line: this error's text, then its innermost cause in parentheses.
    pub fn full_message(&self) -> String {
        let mut root = None;
        let mut cause = std::error::Error::source(self);
        while let Some(inner) = cause {
            root = Some(inner);
            cause = std::error::Error::source(inner);
        }
        match root {
            Some(root) => format!("{} ({})", self, root),
            None => self.to_string(),
        }
    }

    /// Create an RPC error for the given phase.
    pub fn rpc(phase: RpcPhase, message: impl Into<String>) -> Self {
        RendezvousError::Rpc {
            phase,
            message: message.into(),
            source: None,
        }
    }

    /// Payload could not be encoded or decoded.
    pub fn is_serialization(&self) -> bool {
        matches!(
            self,
            RendezvousError::Serialization { .. }
                | RendezvousError::UnknownMessageType(_)
                | RendezvousError::MissingTypeField
                | RendezvousError::UnexpectedMessageType { .. }
        )
    }

    /// Socket-level failure: refused, timed out, closed or oversized frame.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            RendezvousError::Connection { .. }
                | RendezvousError::ConnectionClosed
                | RendezvousError::ReadTimeout(_)
                | RendezvousError::FrameTooLarge { .. }
                | RendezvousError::InvalidFrame { .. }
        )
    }

    /// The RPC phase, if this is a caller-visible RPC error.
    pub fn rpc_phase(&self) -> Option<RpcPhase> {
        match self {
            RendezvousError::Rpc { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

/// Server-local failure while dispatching a call.
///
/// Never thrown across the wire: the callee turns it into an error-status
/// `CallResponse` whose message is this error's `Display` text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Function '{0}' not found")]
    FunctionNotFound(String),

    #[error("Argument mismatch: expected {expected} argument(s), got {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    #[error("Argument mismatch at position {index}: {message}")]
    ArgumentType { index: usize, message: String },

    #[error("Invocation error: {0}")]
    Failed(String),

    #[error("Unexpected error: {0}")]
    Panicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts_to_connection() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: RendezvousError = io.into();
        assert!(err.is_connection());
        assert!(!err.is_serialization());
        assert_eq!(err.to_string(), "Connection error: I/O failure");
        assert_eq!(std::error::Error::source(&err).unwrap().to_string(), "refused");
    }

    #[test]
    fn test_json_error_converts_to_serialization() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: RendezvousError = json_err.into();
        assert!(err.is_serialization());
    }

    #[test]
    fn test_rpc_error_display_names_phase() {
        let err = RendezvousError::rpc(RpcPhase::Resolution, "Function 'x' not found");
        assert_eq!(err.to_string(), "Resolution error: Function 'x' not found");
        assert_eq!(err.rpc_phase(), Some(RpcPhase::Resolution));
    }

    #[test]
    fn test_connection_to_mentions_target() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let err = RendezvousError::connection_to("localhost:7777", io);
        assert_eq!(err.to_string(), "Connection error: Failed to connect to localhost:7777");
        let cause = std::error::Error::source(&err).unwrap();
        assert_eq!(cause.to_string(), "timed out");
    }

    #[test]
    fn test_detach_source_keeps_own_message() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = RendezvousError::registry(
            "Failed to look up service",
            RendezvousError::connection_to("localhost:1", io),
        );

        let (outer, cause) = err.detach_source();
        assert_eq!(outer.to_string(), "Registry error: Failed to look up service");
        assert!(std::error::Error::source(&outer).is_none());
        assert!(cause.unwrap().is_connection());

        let (plain, cause) = RendezvousError::ConnectionClosed.detach_source();
        assert!(matches!(plain, RendezvousError::ConnectionClosed));
        assert!(cause.is_none());
    }

    #[test]
    fn test_full_message_is_one_line_with_root_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "Connection refused");
        let err = RendezvousError::Rpc {
            phase: RpcPhase::Resolution,
            message: "Registry error: Failed to look up service".to_string(),
            source: Some(Box::new(RendezvousError::connection_to("localhost:1", io))),
        };

        let line = err.full_message();
        assert_eq!(
            line,
            "Resolution error: Registry error: Failed to look up service (Connection refused)"
        );
        assert!(!line.contains('\n'));
        assert_eq!(line.matches("Connection refused").count(), 1);

        let plain = RendezvousError::rpc(RpcPhase::Invocation, "Function invocation failed: boom");
        assert_eq!(
            plain.full_message(),
            "Invocation error: Function invocation failed: boom"
        );
    }

    #[test]
    fn test_dispatch_error_messages() {
        assert_eq!(
            DispatchError::FunctionNotFound("toggle".into()).to_string(),
            "Function 'toggle' not found"
        );
        assert!(DispatchError::ArgumentCount { expected: 2, actual: 0 }
            .to_string()
            .contains("expected 2"));
    }
}
