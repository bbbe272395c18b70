//! Duplex connection capability used by the registry.

use async_trait::async_trait;

use crate::error::TransportError;

/// A live, message-oriented duplex channel to one client.
///
/// Sending and receiving may happen concurrently from different tasks: the
/// session's read loop waits in `receive_message` while notifications are
/// written through `send_message`.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Write one discrete message.
    async fn send_message(&self, message: Vec<u8>) -> Result<(), TransportError>;

    /// Wait for the next inbound message.
    ///
    /// Returns `Err(TransportError::Closed)` once the peer has closed the
    /// channel; any error ends the connection's session.
    async fn receive_message(&self) -> Result<Vec<u8>, TransportError>;

    /// Close the channel. Closing twice is not an error.
    async fn close(&self) -> Result<(), TransportError>;
}
