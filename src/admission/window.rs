//! Fixed-window request counter.

use chrono::{DateTime, TimeDelta, Utc};

/// Request count for one identity within its current window.
///
/// The window does not slide: it starts at the first admitted request and is
/// replaced wholesale by the first request that arrives after it has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    /// Requests admitted since `window_start`
    pub count: u32,
    /// When the current window opened
    pub window_start: DateTime<Utc>,
}

impl RateWindow {
    /// Open a window holding the request that created it.
    pub fn open(now: DateTime<Utc>) -> Self {
        Self {
            count: 1,
            window_start: now,
        }
    }

    /// Whether strictly more than `length` has passed since the window opened.
    pub fn is_expired(&self, now: DateTime<Utc>, length: TimeDelta) -> bool {
        now - self.window_start > length
    }

    /// Count one request against the window.
    ///
    /// An expired window is reset to hold just this request. Otherwise the
    /// request is admitted while `count < quota`. A rejected request leaves
    /// the window untouched.
    pub fn try_admit(&mut self, now: DateTime<Utc>, quota: u32, length: TimeDelta) -> bool {
        if self.is_expired(now, length) {
            *self = Self::open(now);
            return true;
        }

        if self.count < quota {
            self.count += 1;
            return true;
        }

        false
    }

    /// When this window stops counting against its owner.
    pub fn resets_at(&self, length: TimeDelta) -> DateTime<Utc> {
        self.window_start
            .checked_add_signed(length)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
