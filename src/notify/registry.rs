//! Identity-to-connection table and event fan-out.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use super::connection::Connection;
use super::event::DomainEvent;
use crate::error::Result;

/// What `register` does with a connection it replaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupersedePolicy {
    /// Hand the old connection back to the caller and leave it open.
    #[default]
    Retain,
    /// Close the old connection before returning.
    Close,
}

/// What `notify` does when writing to a connection fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteFailurePolicy {
    /// Report the error; only the session's read loop removes the entry.
    #[default]
    Ignore,
    /// Remove and close the connection, as if the peer had disconnected.
    Disconnect,
}

/// Identifies one registration, so a superseded session cannot remove the
/// connection that replaced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone)]
struct Registration {
    id: RegistrationId,
    connection: Arc<dyn Connection>,
}

/// A registration displaced by [`ConnectionRegistry::insert`], not yet
/// retained or closed.
pub(crate) struct Superseded(Registration);

/// Process-wide table of live connections, at most one per identity.
///
/// Lookups clone the connection handle out of the map and release the shard
/// lock before any I/O, so a slow write never blocks registration or removal.
/// Connections are always removed from the table before they are closed.
pub struct ConnectionRegistry {
    connections: DashMap<String, Registration>,
    next_id: AtomicU64,
    supersede: SupersedePolicy,
    on_write_failure: WriteFailurePolicy,
}

impl ConnectionRegistry {
    /// Create a registry with the default policies: superseded connections
    /// stay open and write failures do not disconnect.
    pub fn new() -> Self {
        Self::with_policies(SupersedePolicy::default(), WriteFailurePolicy::default())
    }

    /// Create a registry with explicit policies.
    pub fn with_policies(supersede: SupersedePolicy, on_write_failure: WriteFailurePolicy) -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            supersede,
            on_write_failure,
        }
    }

    /// Make `connection` the live connection for `identity`.
    ///
    /// The last registration wins. Under [`SupersedePolicy::Retain`] a
    /// replaced connection is returned to the caller still open; under
    /// [`SupersedePolicy::Close`] it is closed and `None` is returned.
    pub async fn register(
        &self,
        identity: &str,
        connection: Arc<dyn Connection>,
    ) -> (RegistrationId, Option<Arc<dyn Connection>>) {
        let (id, previous) = self.insert(identity, connection);
        (id, self.retire_superseded(identity, previous).await)
    }

    /// Insert `connection` for `identity` without touching the connection it
    /// replaces. The caller must pass the result to
    /// [`retire_superseded`](Self::retire_superseded).
    pub(crate) fn insert(
        &self,
        identity: &str,
        connection: Arc<dyn Connection>,
    ) -> (RegistrationId, Option<Superseded>) {
        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let previous = self
            .connections
            .insert(identity.to_string(), Registration { id, connection });

        info!(identity = %identity, registration = %id, "Client connected");
        (id, previous.map(Superseded))
    }

    /// Apply the supersede policy to a connection replaced by [`insert`](Self::insert).
    pub(crate) async fn retire_superseded(
        &self,
        identity: &str,
        previous: Option<Superseded>,
    ) -> Option<Arc<dyn Connection>> {
        let Superseded(previous) = previous?;

        match self.supersede {
            SupersedePolicy::Retain => {
                debug!(
                    identity = %identity,
                    superseded = %previous.id,
                    "Replaced existing connection"
                );
                Some(previous.connection)
            }
            SupersedePolicy::Close => {
                debug!(
                    identity = %identity,
                    superseded = %previous.id,
                    "Closing superseded connection"
                );
                if let Err(e) = previous.connection.close().await {
                    warn!(identity = %identity, error = %e, "Failed to close superseded connection");
                }
                None
            }
        }
    }

    /// Remove whatever connection is registered for `identity`.
    ///
    /// Returns the removed connection, still open, so the caller can close it.
    pub fn unregister(&self, identity: &str) -> Option<Arc<dyn Connection>> {
        let removed = self.connections.remove(identity).map(|(_, r)| r);
        if let Some(ref registration) = removed {
            info!(identity = %identity, registration = %registration.id, "Client unregistered");
        }
        removed.map(|r| r.connection)
    }

    /// Remove the entry for `identity` only if it is still registration `id`.
    pub fn unregister_registration(
        &self,
        identity: &str,
        id: RegistrationId,
    ) -> Option<Arc<dyn Connection>> {
        let removed = self
            .connections
            .remove_if(identity, |_, registration| registration.id == id)
            .map(|(_, r)| r.connection);
        if removed.is_some() {
            info!(identity = %identity, registration = %id, "Client disconnected");
        } else {
            trace!(identity = %identity, registration = %id, "Registration already replaced or removed");
        }
        removed
    }

    /// Deliver `event` to `identity` if it has a live connection.
    ///
    /// Absent recipients are not an error. Serialization and write failures
    /// are returned; the event is not retried or queued.
    pub async fn notify(&self, identity: &str, event: &DomainEvent) -> Result<()> {
        let Some(registration) = self.connections.get(identity).map(|e| e.value().clone()) else {
            trace!(identity = %identity, event = event.kind(), "Recipient not connected, dropping event");
            return Ok(());
        };

        let message = event.to_message()?;

        if let Err(e) = registration.connection.send_message(message).await {
            warn!(
                identity = %identity,
                event = event.kind(),
                error = %e,
                "Failed to deliver event"
            );
            if self.on_write_failure == WriteFailurePolicy::Disconnect {
                if let Some(connection) = self.unregister_registration(identity, registration.id) {
                    if let Err(e) = connection.close().await {
                        warn!(identity = %identity, error = %e, "Failed to close connection after write failure");
                    }
                }
            }
            return Err(e.into());
        }

        debug!(identity = %identity, event = event.kind(), "Event delivered");
        Ok(())
    }

    /// Deliver `event` to its own recipient.
    pub async fn publish(&self, event: &DomainEvent) -> Result<()> {
        self.notify(event.recipient(), event).await
    }

    /// Whether `identity` has a live connection.
    pub fn is_connected(&self, identity: &str) -> bool {
        self.connections.contains_key(identity)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Remove and close every connection. Used on shutdown.
    pub async fn close_all(&self) -> usize {
        let snapshot: Vec<(String, RegistrationId)> = self
            .connections
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().id))
            .collect();

        let mut closed = 0;
        for (identity, id) in snapshot {
            if let Some(connection) = self.unregister_registration(&identity, id) {
                if let Err(e) = connection.close().await {
                    warn!(identity = %identity, error = %e, "Failed to close connection during shutdown");
                }
                closed += 1;
            }
        }

        info!(closed, "Closed all live connections");
        closed
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
