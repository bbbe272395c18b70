//! In-memory [`Connection`] for tests.
//!
//! [`MockConnection::pair`] returns the connection handed to the registry and
//! a [`MockPeer`] playing the remote client: it reads what the server sent
//! and can push messages or hang up.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};

use super::connection::Connection;
use crate::error::TransportError;

/// Channel-backed connection double.
#[derive(Debug)]
pub struct MockConnection {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    inbound: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    closed: AtomicBool,
    closed_signal: Notify,
    fail_sends: AtomicBool,
    fail_closes: AtomicBool,
    stall_closes: AtomicBool,
    close_calls: AtomicUsize,
}

/// Remote end of a [`MockConnection`].
#[derive(Debug)]
pub struct MockPeer {
    to_server: Option<mpsc::UnboundedSender<Vec<u8>>>,
    from_server: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MockConnection {
    /// Create a connected pair.
    pub fn pair() -> (Arc<MockConnection>, MockPeer) {
        let (outbound, from_server) = mpsc::unbounded_channel();
        let (to_server, inbound) = mpsc::unbounded_channel();

        let connection = Arc::new(MockConnection {
            outbound,
            inbound: Mutex::new(inbound),
            closed: AtomicBool::new(false),
            closed_signal: Notify::new(),
            fail_sends: AtomicBool::new(false),
            fail_closes: AtomicBool::new(false),
            stall_closes: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        });
        let peer = MockPeer {
            to_server: Some(to_server),
            from_server,
        };
        (connection, peer)
    }

    /// Make every subsequent `send_message` fail.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make `close` report an error after closing.
    pub fn fail_closes(&self, fail: bool) {
        self.fail_closes.store(fail, Ordering::SeqCst);
    }

    /// Make `close` hang forever without closing, like a peer that never
    /// acknowledges the close handshake.
    pub fn stall_closes(&self, stall: bool) {
        self.stall_closes.store(stall, Ordering::SeqCst);
    }

    /// Whether `close` has completed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// How many times `close` has been called.
    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn send_message(&self, message: Vec<u8>) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send("injected send failure".to_string()));
        }
        self.outbound
            .send(message)
            .map_err(|_| TransportError::Closed)
    }

    async fn receive_message(&self) -> Result<Vec<u8>, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            message = inbound.recv() => message.ok_or(TransportError::Closed),
            _ = self.closed_signal.notified() => Err(TransportError::Closed),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.stall_closes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.closed_signal.notify_one();
        }
        if self.fail_closes.load(Ordering::SeqCst) {
            return Err(TransportError::Send("injected close failure".to_string()));
        }
        Ok(())
    }
}

impl MockPeer {
    /// Send a message to the server side.
    pub fn send(&self, message: impl Into<Vec<u8>>) -> bool {
        self.to_server
            .as_ref()
            .map(|tx| tx.send(message.into()).is_ok())
            .unwrap_or(false)
    }

    /// Hang up; the server's pending `receive_message` fails with `Closed`.
    pub fn disconnect(&mut self) {
        self.to_server = None;
    }

    /// Wait for the next message the server sent.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.from_server.recv().await
    }

    /// Take the next message the server sent, if one is queued.
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.from_server.try_recv().ok()
    }

    /// Take every queued message.
    pub fn drain(&mut self) -> Vec<Vec<u8>> {
        let mut messages = Vec::new();
        while let Ok(message) = self.from_server.try_recv() {
            messages.push(message);
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_round_trip() {
        let (conn, mut peer) = MockConnection::pair();

        conn.send_message(b"hello".to_vec()).await.unwrap();
        assert_eq!(peer.recv().await, Some(b"hello".to_vec()));

        assert!(peer.send("ping"));
        assert_eq!(conn.receive_message().await.unwrap(), b"ping".to_vec());
    }

    #[tokio::test]
    async fn test_disconnect_fails_receive() {
        let (conn, mut peer) = MockConnection::pair();
        peer.disconnect();
        assert_eq!(conn.receive_message().await, Err(TransportError::Closed));
    }

    #[tokio::test]
    async fn test_close_wakes_pending_receive() {
        let (conn, _peer) = MockConnection::pair();
        let reader = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.receive_message().await })
        };

        tokio::task::yield_now().await;
        conn.close().await.unwrap();

        assert_eq!(reader.await.unwrap(), Err(TransportError::Closed));
        assert!(conn.is_closed());
        assert_eq!(
            conn.send_message(b"late".to_vec()).await,
            Err(TransportError::Closed)
        );
    }

    #[tokio::test]
    async fn test_injected_send_failure() {
        let (conn, mut peer) = MockConnection::pair();
        conn.fail_sends(true);

        assert!(matches!(
            conn.send_message(b"x".to_vec()).await,
            Err(TransportError::Send(_))
        ));
        assert!(peer.try_recv().is_none());
    }
}
