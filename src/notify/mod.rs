//! Live connection registry and best-effort event delivery.
//!
//! At most one connection is addressable per identity. Events for an
//! identity without a connection are dropped silently; delivery is never
//! retried or queued.

mod connection;
mod event;
pub mod mocks;
mod registry;
pub mod session;

pub use connection::Connection;
pub use event::{BidEvent, DomainEvent};
pub use registry::{ConnectionRegistry, RegistrationId, SupersedePolicy, WriteFailurePolicy};
