//! P2P system error types
//!
//! This module defines the flat error taxonomy shared by every backend. All
//! fallible operations in the crate return [`P2PResult`].
//!
//! Packet loss is never reported through these errors: a dropped packet is a
//! successful `send` that delivers nothing.

use thiserror::Error;

/// P2P system error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum P2PError {
    /// Generic network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// A connection could not be established
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The target node is not part of the network
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// The bytes do not form a valid node id for this backend
    #[error("Invalid node ID: {0}")]
    InvalidNodeId(String),

    /// A suspended operation did not complete in time
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The connection was closed locally
    #[error("Connection closed")]
    ConnectionClosed,

    /// No active path exists between the two nodes
    #[error("No route from {from} to {to}")]
    NoRoute {
        /// Short form of the sending node id
        from: String,
        /// Short form of the destination node id
        to: String,
    },

    /// Name resolution found no matching node
    #[error("Discovery failed: {0}")]
    DiscoveryFailed(String),

    /// The remote side violated the transport protocol
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The payload exceeds the configured maximum message size
    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge {
        /// Size of the rejected payload
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// The remote peer could not be authenticated
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A configuration value was malformed or out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for P2PError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value.to_string())
    }
}

/// Convenience type alias for P2P operations that may fail.
///
/// This alias wraps `Result` with [`P2PError`] as the error type,
/// providing a consistent error handling pattern across the crate.
pub type P2PResult<T> = Result<T, P2PError>;
