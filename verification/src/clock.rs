//! Wall-clock abstraction so cooldowns and expiry are testable.

use ekyc_types::Timestamp;

/// Source of the current time for every policy decision.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// The system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}
