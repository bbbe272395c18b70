//! HTTP and WebSocket surface.
//!
//! Composes the admission controller and the connection registry into the
//! request path: bid submissions pass the admission gate, `/ws` upgrades
//! become registered sessions, and bid/award endpoints publish events.

pub mod auth;
pub mod bids;
pub mod gate;
mod server;
pub mod ws;

pub use server::{router, AppState, HttpServer};
