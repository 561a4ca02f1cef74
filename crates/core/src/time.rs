use chrono::{DateTime, Duration, Utc};
use std::fmt::Write as _;

/// Clock abstraction so services and tests share one notion of "now".
///
/// The engine computes expiries and warning boundaries from wall-clock
/// arithmetic only; injecting a fixed clock makes all of it deterministic
/// under test.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    Default,
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// A clock following real system time.
    #[must_use]
    pub fn system() -> Self {
        Self::Default
    }

    /// A clock frozen at the given instant.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    /// Current time according to this clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::Default => Utc::now(),
            Clock::Fixed(at) => *at,
        }
    }

    /// Advances a fixed clock; no effect on the system clock.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(at) = self {
            *at += delta;
        }
    }
}

/// Renders remaining seconds as `MM:SS` for countdown display.
///
/// Negative input clamps to `00:00`.
#[must_use]
pub fn format_mm_ss(seconds: i64) -> String {
    if seconds <= 0 {
        return "00:00".to_owned();
    }
    let mut out = String::with_capacity(5);
    let _ = write!(out, "{:02}:{:02}", seconds / 60, seconds % 60);
    out
}

/// Deterministic timestamp for tests (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// A `Clock` frozen at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}
