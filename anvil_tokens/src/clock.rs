//! Sources of the current time
//!
//! Token expiry is validated against a [`Clock`] so that tests can pin the current
//! time instead of depending on the system clock.

use chrono::{DateTime, Duration, Utc};

/// Represents a clock, which can tell the current time
pub trait Clock {
    /// Gets the current time according to this clock
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct System;

impl Clock for System {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A test clock which maintains the current time as internal state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TestClock(DateTime<Utc>);

impl Clock for TestClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

impl TestClock {
    /// Creates a new test clock with the specified time
    #[inline]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self(time)
    }

    /// Advances the clock's current time by `inc`
    pub fn advance(&mut self, inc: Duration) {
        self.0 += inc;
    }
}
