//! Time source for expiry decisions.
//!
//! Session validity is "now < expires", so whoever controls "now" controls
//! the tests. [`SystemClock`] is what runs in production; [`ManualClock`]
//! only moves when told to.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// A source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// The current instant, in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that stands still until advanced.
///
/// Cloning shares the underlying time, so a test can hand one clone to the
/// service and keep another to turn the hands.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    /// Start the clock at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Start the clock at the current system time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Jump to an absolute time. Going backwards is allowed; the service
    /// does not assume monotonic clocks.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.write() = to;
    }

    /// Move forward by `by`. Durations past the representable range leave
    /// the clock where it is.
    pub fn advance(&self, by: Duration) {
        let Ok(delta) = chrono::Duration::from_std(by) else {
            return;
        };
        let mut now = self.now.write();
        if let Some(next) = now.checked_add_signed(delta) {
            *now = next;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(90));
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::starting_now();
        let handle = clock.clone();
        handle.advance(Duration::from_secs(3600));
        assert_eq!(clock.now(), handle.now());
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
