//! Core admission controller implementation.

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::window::RateWindow;

/// Default number of bid submissions per window.
const DEFAULT_QUOTA: u32 = 5;
/// Default window length.
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Quota and window length enforced per identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    /// Maximum requests admitted in one window
    pub quota: u32,
    /// Window length
    pub window: Duration,
}

impl AdmissionPolicy {
    /// Create a policy admitting `quota` requests per `window`.
    pub fn new(quota: u32, window: Duration) -> Self {
        Self { quota, window }
    }

    fn window_delta(&self) -> TimeDelta {
        TimeDelta::from_std(self.window).unwrap_or(TimeDelta::MAX)
    }
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_QUOTA, DEFAULT_WINDOW)
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed.
    Allowed,
    /// The quota for the current window is spent.
    Rejected {
        /// When the current window ends and requests are admitted again
        retry_after: DateTime<Utc>,
    },
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    /// Retry time as Unix epoch seconds, for rejected requests.
    pub fn retry_after_epoch(&self) -> Option<i64> {
        match self {
            Decision::Allowed => None,
            Decision::Rejected { retry_after } => Some(retry_after.timestamp()),
        }
    }
}

/// Per-identity fixed-window admission controller.
///
/// Every check takes the table's write lock for exactly one
/// read-modify-write, so concurrent checks for the same identity never over-
/// or under-count.
pub struct AdmissionController {
    /// Current window per identity
    windows: RwLock<HashMap<String, RateWindow>>,
    policy: AdmissionPolicy,
    clock: Arc<dyn Clock>,
}

impl AdmissionController {
    /// Create a controller using the system clock.
    pub fn new(policy: AdmissionPolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock::new()))
    }

    /// Create a controller reading time from `clock`.
    pub fn with_clock(policy: AdmissionPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            policy,
            clock,
        }
    }

    /// The enforced policy.
    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    /// Current time as seen by the controller's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Whether a request from `identity` may proceed.
    pub fn check(&self, identity: &str) -> bool {
        self.admit(identity).is_allowed()
    }

    /// Count a request from `identity` and decide whether it may proceed.
    ///
    /// `identity` is expected to be non-empty; the caller establishes it
    /// before the controller is consulted.
    pub fn admit(&self, identity: &str) -> Decision {
        let now = self.clock.now();
        let length = self.policy.window_delta();

        let mut windows = self.windows.write();

        let Some(window) = windows.get_mut(identity) else {
            debug!(identity = %identity, "Opening admission window");
            windows.insert(identity.to_string(), RateWindow::open(now));
            return Decision::Allowed;
        };

        if window.try_admit(now, self.policy.quota, length) {
            trace!(
                identity = %identity,
                count = window.count,
                quota = self.policy.quota,
                "Request admitted"
            );
            Decision::Allowed
        } else {
            let retry_after = window.resets_at(length);
            debug!(
                identity = %identity,
                count = window.count,
                retry_after = %retry_after,
                "Admission quota exhausted"
            );
            Decision::Rejected { retry_after }
        }
    }

    /// Drop every window that has expired, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let length = self.policy.window_delta();

        let mut windows = self.windows.write();
        let before = windows.len();
        windows.retain(|_, window| !window.is_expired(now, length));
        let removed = before - windows.len();

        if removed > 0 {
            debug!(removed, remaining = windows.len(), "Swept stale admission windows");
        }
        removed
    }

    /// Snapshot of the window tracked for `identity`.
    pub fn window(&self, identity: &str) -> Option<RateWindow> {
        self.windows.read().get(identity).copied()
    }

    /// Number of identities currently tracked.
    pub fn window_count(&self) -> usize {
        self.windows.read().len()
    }

    /// Forget every window.
    pub fn clear(&self) {
        self.windows.write().clear();
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(AdmissionPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::MockClock;
    use chrono::TimeZone;

    fn controller_at(start: DateTime<Utc>) -> (AdmissionController, MockClock) {
        let clock = MockClock::new(start);
        let controller =
            AdmissionController::with_clock(AdmissionPolicy::default(), Arc::new(clock.clone()));
        (controller, clock)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_controller_creation() {
        let controller = AdmissionController::default();
        assert_eq!(controller.window_count(), 0);
        assert_eq!(controller.policy().quota, 5);
    }

    #[test]
    fn test_first_check_creates_window() {
        let (controller, _clock) = controller_at(t0());

        assert!(controller.check("c1"));
        assert_eq!(controller.window_count(), 1);
        assert_eq!(controller.window("c1"), Some(RateWindow::open(t0())));
    }

    #[test]
    fn test_quota_then_rejection() {
        let (controller, _clock) = controller_at(t0());

        for i in 1..=5 {
            assert!(controller.check("c1"), "Request {} should be admitted", i);
        }

        let decision = controller.admit("c1");
        assert_eq!(
            decision,
            Decision::Rejected {
                retry_after: t0() + TimeDelta::seconds(60)
            }
        );
        assert_eq!(decision.retry_after_epoch(), Some(t0().timestamp() + 60));
        assert_eq!(controller.window("c1").unwrap().count, 5);
    }

    #[test]
    fn test_window_resets_after_expiry() {
        let (controller, clock) = controller_at(t0());

        for _ in 0..5 {
            controller.check("c1");
        }
        assert!(!controller.check("c1"));

        // Exactly one window later is still the same window
        clock.advance(Duration::from_secs(60));
        assert!(!controller.check("c1"));

        clock.advance(Duration::from_millis(1));
        assert!(controller.check("c1"));
        assert_eq!(controller.window("c1").unwrap().count, 1);
    }

    #[test]
    fn test_identities_are_independent() {
        let (controller, clock) = controller_at(t0());

        for _ in 0..5 {
            controller.check("c1");
        }
        clock.advance(Duration::from_secs(10));
        assert!(controller.check("c2"));

        let c1 = controller.window("c1").unwrap();
        let c2 = controller.window("c2").unwrap();
        assert_eq!((c1.count, c1.window_start), (5, t0()));
        assert_eq!(
            (c2.count, c2.window_start),
            (1, t0() + TimeDelta::seconds(10))
        );
    }

    #[test]
    fn test_sweep_removes_only_stale_windows() {
        let (controller, clock) = controller_at(t0());

        controller.check("stale");
        clock.advance(Duration::from_secs(30));
        controller.check("fresh");
        clock.advance(Duration::from_secs(31));

        assert_eq!(controller.sweep(), 1);
        assert!(controller.window("stale").is_none());
        assert!(controller.window("fresh").is_some());
    }

    #[test]
    fn test_clear_windows() {
        let (controller, _clock) = controller_at(t0());
        controller.check("c1");
        controller.check("c2");

        controller.clear();
        assert_eq!(controller.window_count(), 0);
    }

    #[test]
    fn test_decision_helpers() {
        assert!(Decision::Allowed.is_allowed());
        assert_eq!(Decision::Allowed.retry_after_epoch(), None);
    }
}
