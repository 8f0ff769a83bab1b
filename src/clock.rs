//! Wall-clock source used for event ageing and bucket rotation

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Source of the current time
pub trait TimeProvider: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;

    /// Current time in whole Unix seconds
    fn now_secs(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Reads the system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualTimeProvider {
    secs: AtomicI64,
}

impl ManualTimeProvider {
    /// Start at the given Unix second
    pub fn new(secs: i64) -> Self {
        Self {
            secs: AtomicI64::new(secs),
        }
    }

    /// Move forward
    pub fn advance(&self, duration: Duration) {
        let delta = i64::try_from(duration.as_secs()).unwrap_or(i64::MAX);
        self.secs.fetch_add(delta, Ordering::Relaxed);
    }

    /// Jump to the given Unix second
    pub fn set(&self, secs: i64) {
        self.secs.store(secs, Ordering::Relaxed);
    }
}

impl TimeProvider for ManualTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        let secs = self.secs.load(Ordering::Relaxed);
        Utc.timestamp_opt(secs, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    fn now_secs(&self) -> i64 {
        self.secs.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualTimeProvider::new(1_000);
        assert_eq!(clock.now_secs(), 1_000);
        assert_eq!(clock.now().timestamp(), 1_000);

        clock.advance(Duration::from_secs(25));
        assert_eq!(clock.now_secs(), 1_025);

        clock.set(50);
        assert_eq!(clock.now_secs(), 50);
    }

    #[test]
    fn test_system_clock_is_current() {
        let before = Utc::now().timestamp();
        let now = SystemTimeProvider.now_secs();
        assert!(now >= before);
    }
}
