//! Bidgate - Bid Admission and Live Notification Service
//!
//! This crate guards bid submission in a tendering marketplace with a
//! per-contractor fixed-window admission controller, and pushes new-bid and
//! award events to connected users over WebSocket channels.

pub mod admission;
pub mod config;
pub mod error;
pub mod http;
pub mod notify;
