//! Lifecycle of one live connection.
//!
//! `Unregistered -> Registered -> Unregistered`: the connection is
//! registered, a read loop waits on it until any read error (a peer close
//! included), and then the entry is removed from the registry before the
//! connection is closed.

use std::sync::Arc;
use tracing::{debug, info, trace};

use super::connection::Connection;
use super::registry::{ConnectionRegistry, RegistrationId};
use crate::error::TransportError;

/// Removes the registration if the session future is dropped before its
/// read loop ends, e.g. when the task is aborted.
struct RegistrationGuard {
    registry: Arc<ConnectionRegistry>,
    identity: String,
    id: RegistrationId,
    connection: Arc<dyn Connection>,
    armed: bool,
}

impl RegistrationGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if self
            .registry
            .unregister_registration(&self.identity, self.id)
            .is_some()
        {
            debug!(identity = %self.identity, "Session cancelled, closing connection");
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let connection = self.connection.clone();
            runtime.spawn(async move {
                let _ = connection.close().await;
            });
        }
    }
}

/// Serve one connection for `identity` until it fails or is closed.
///
/// Inbound messages are read only to detect liveness and are otherwise
/// discarded. Returns the read error that ended the session.
pub async fn serve(
    registry: Arc<ConnectionRegistry>,
    identity: String,
    connection: Arc<dyn Connection>,
) -> TransportError {
    let (id, previous) = registry.insert(&identity, connection.clone());

    // Armed before the first await so an abort while closing the superseded
    // connection still removes this registration
    let mut guard = RegistrationGuard {
        registry: registry.clone(),
        identity: identity.clone(),
        id,
        connection: connection.clone(),
        armed: true,
    };

    // A retained superseded connection keeps running under its own session
    drop(registry.retire_superseded(&identity, previous).await);

    let reason = loop {
        match connection.receive_message().await {
            Ok(message) => {
                trace!(identity = %identity, bytes = message.len(), "Ignoring inbound message");
            }
            Err(e) => break e,
        }
    };

    guard.disarm();
    registry.unregister_registration(&identity, id);
    let _ = connection.close().await;

    info!(identity = %identity, registration = %id, reason = %reason, "Session ended");
    reason
}
