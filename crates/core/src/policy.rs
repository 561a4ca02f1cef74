//! Fixed exam policy: category distribution, durations and thresholds.
//!
//! These are properties of the exam definition, not tunables; runtime
//! configuration may override the ones that are operational (pass percent,
//! sweep interval) but the distribution itself is part of the blueprint.

use chrono::Duration;

use crate::model::Section;

/// Exam blueprint code.
pub const EXAM_CODE: &str = "JSA-41-01";

/// Every session holds exactly this many questions.
pub const TOTAL_QUESTIONS: u32 = 40;

/// Timed-exam window, minutes.
pub const EXAM_DURATION_MIN: i64 = 60;

/// Default passing threshold, integer percent.
pub const PASS_PERCENT: u32 = 70;

/// Days a failed candidate waits before retaking (cooldown anchor lives on
/// the user record; enforcement is layered above this core).
pub const FAILED_COOLDOWN_DAYS: i64 = 15;

/// Expiry monitor sweep interval, seconds.
pub const SWEEP_INTERVAL_SECS: u64 = 30;

/// Per-section question quota. The draws are per section only; there is no
/// cross-section substitution when a pool runs short.
pub const DISTRIBUTION: [(Section, u32); 4] = [
    (Section::Objects, 11),
    (Section::Classes, 7),
    (Section::Builtins, 12),
    (Section::AdvFunc, 10),
];

/// Quota for one section.
#[must_use]
pub fn quota_for(section: Section) -> u32 {
    DISTRIBUTION
        .iter()
        .find(|(s, _)| *s == section)
        .map_or(0, |(_, n)| *n)
}

/// The exam window as a `chrono::Duration`.
#[must_use]
pub fn exam_duration() -> Duration {
    Duration::minutes(EXAM_DURATION_MIN)
}
