//! Per-contractor admission control for bid submission.
//!
//! A fixed-window counter per identity: the first request opens a window,
//! up to `quota` requests are admitted inside it, and the first request after
//! the window has elapsed starts a fresh one. Stale windows are reclaimed by
//! the [`Sweeper`].

mod clock;
mod controller;
mod sweeper;
mod window;

pub use clock::{Clock, MockClock, SystemClock};
pub use controller::{AdmissionController, AdmissionPolicy, Decision};
pub use sweeper::{Sweeper, SweeperHandle};
pub use window::RateWindow;
