//! Error types for the Bidgate service.

use thiserror::Error;

/// Main error type for Bidgate operations.
#[derive(Error, Debug)]
pub enum BidgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A domain event could not be encoded for the wire
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Writing to or closing a live connection failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A background task did not stop cleanly
    #[error("Shutdown error: {0}")]
    Shutdown(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by a duplex connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer closed the connection or it was closed locally.
    #[error("connection closed")]
    Closed,

    /// An outbound message could not be written.
    #[error("send failed: {0}")]
    Send(String),

    /// The inbound side failed before a message arrived.
    #[error("receive failed: {0}")]
    Receive(String),
}

/// Result type alias for Bidgate operations.
pub type Result<T> = std::result::Result<T, BidgateError>;
