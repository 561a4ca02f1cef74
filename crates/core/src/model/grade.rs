use serde::{Deserialize, Serialize};

use crate::model::question::Section;

/// Per-section slice of a grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionStats {
    pub section: Section,
    pub total: u32,
    pub correct: u32,
}

/// Aggregate result of grading one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeResult {
    pub total: u32,
    pub correct: u32,
    /// 0..=100, rounded half-up to the nearest integer.
    pub percent: u32,
    pub by_section: Vec<SectionStats>,
}

/// Grade plus the pass/fail verdict against a pass threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub result: GradeResult,
    pub passed: bool,
}

/// Integer percentage with round-half-up semantics; 0 when `total` is 0.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn percent_of(correct: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    (f64::from(correct) * 100.0 / f64::from(total)).round() as u32
}
