use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use time::UtcDateTime;

/// Source of "now" in Unix milliseconds.
///
/// Expiry, cooldowns and diff checkpoints all compare against wall-clock time;
/// injecting the clock keeps them testable.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

pub type ClockHandle = Arc<dyn Clock>;

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        let nanos = UtcDateTime::now().unix_timestamp_nanos();
        i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
    }
}

impl SystemClock {
    pub fn handle() -> ClockHandle {
        Arc::new(Self)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn at(millis: i64) -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(millis)))
    }

    pub fn set(&self, millis: i64) {
        self.0.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}
