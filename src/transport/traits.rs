// Transport Types
// Connection handles, configuration and errors shared by the TCP peer links

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// TRANSPORT CONFIG
// ============================================================================

/// Configuration for peer connections
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Maximum number of simultaneous connections
    pub max_connections: u32,
    /// Outbound connect timeout in seconds (None = wait for the OS)
    pub connect_timeout_secs: Option<u32>,
    /// Frames queued per peer before sends to it start failing
    pub send_queue_capacity: usize,
    /// Largest inbound frame accepted, in bytes
    pub max_frame_bytes: usize,
    /// Enable TCP_NODELAY
    pub nodelay: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            connect_timeout_secs: None,
            send_queue_capacity: 256,
            max_frame_bytes: 16 * 1024 * 1024,
            nodelay: true,
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_connect_timeout(mut self, secs: Option<u32>) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn with_send_queue_capacity(mut self, capacity: usize) -> Self {
        self.send_queue_capacity = capacity;
        self
    }

    pub fn with_max_frame_bytes(mut self, bytes: usize) -> Self {
        self.max_frame_bytes = bytes;
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.max_connections == 0 {
            return Err(TransportError::InvalidConfig("max_connections cannot be 0".to_string()));
        }
        if self.send_queue_capacity == 0 {
            return Err(TransportError::InvalidConfig("send_queue_capacity cannot be 0".to_string()));
        }
        if self.max_frame_bytes == 0 {
            return Err(TransportError::InvalidConfig("max_frame_bytes cannot be 0".to_string()));
        }
        if self.connect_timeout_secs == Some(0) {
            return Err(TransportError::InvalidConfig("connect timeout cannot be 0".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// CONNECTION ID
// ============================================================================

/// Unique handle for a live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId([u8; 16]);

impl ConnectionId {
    /// Generate a new unique connection ID
    pub fn generate() -> Self {
        use rand::Rng;
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

// ============================================================================
// DIRECTION / STATE
// ============================================================================

/// Which side opened the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Accepted by our listener
    Inbound,
    /// Dialed by us
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => write!(f, "inbound"),
            Self::Outbound => write!(f, "outbound"),
        }
    }
}

/// State of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    Open,
    #[default]
    Closed,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

// ============================================================================
// TRANSPORT ERRORS
// ============================================================================

/// Errors that can occur on a peer link
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Maximum connections reached")]
    MaxConnectionsReached,

    #[error("Not connected")]
    NotConnected,

    #[error("Transport already running")]
    AlreadyRunning,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Frame too large ({size} bytes, limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Frame is not valid UTF-8: {0}")]
    InvalidEncoding(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl TransportError {
    /// Check if the link can keep being used after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PayloadTooLarge { .. } | Self::InvalidEncoding(_) | Self::SendFailed(_)
        )
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}
