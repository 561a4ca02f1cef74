use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{ExamId, SessionId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("unknown session mode: {0}")]
    UnknownMode(String),

    #[error("unknown session status: {0}")]
    UnknownStatus(String),

    #[error("exam sessions must carry an expiry, practice sessions must not")]
    ExpiryModeMismatch,

    #[error("current index {index} outside 1..={total}")]
    IndexOutOfRange { index: u32, total: u32 },

    #[error("terminal session is missing its finish timestamp")]
    MissingFinishTimestamp,

    #[error("session has no questions")]
    EmptyQuestionSet,
}

//
// ─── MODE / STATUS / WARNINGS ──────────────────────────────────────────────────
//

/// Timed exam vs. untimed practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Exam,
    Practice,
}

/// Lifecycle state of a session. Transitions are monotonic: `Active` may move
/// to `Submitted` or `Expired`; terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Submitted,
    Expired,
}

impl SessionMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Exam => "exam",
            SessionMode::Practice => "practice",
        }
    }
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Submitted => "submitted",
            SessionStatus::Expired => "expired",
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionMode {
    type Err = SessionStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exam" => Ok(SessionMode::Exam),
            "practice" => Ok(SessionMode::Practice),
            other => Err(SessionStateError::UnknownMode(other.to_owned())),
        }
    }
}

impl FromStr for SessionStatus {
    type Err = SessionStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "submitted" => Ok(SessionStatus::Submitted),
            "expired" => Ok(SessionStatus::Expired),
            other => Err(SessionStateError::UnknownStatus(other.to_owned())),
        }
    }
}

/// A remaining-time boundary at which one notification fires, once per
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningKind {
    TenMinutes,
    FiveMinutes,
    OneMinute,
}

impl WarningKind {
    #[must_use]
    pub fn threshold_seconds(&self) -> i64 {
        match self {
            WarningKind::TenMinutes => 600,
            WarningKind::FiveMinutes => 300,
            WarningKind::OneMinute => 60,
        }
    }

    #[must_use]
    pub fn minutes(&self) -> u32 {
        match self {
            WarningKind::TenMinutes => 10,
            WarningKind::FiveMinutes => 5,
            WarningKind::OneMinute => 1,
        }
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One exam or practice attempt by one user.
///
/// Holds the lifecycle state, the timing window, the current question pointer
/// and the once-only warning flags. Question bindings and chosen answers live
/// in their own tables behind the session repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    user_id: UserId,
    exam_id: ExamId,
    mode: SessionMode,
    status: SessionStatus,
    started_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    current_index: u32,
    total_count: u32,
    warn10_sent: bool,
    warn5_sent: bool,
    warn1_sent: bool,
    correct_count: Option<u32>,
    score_percent: Option<u32>,
}

impl Session {
    /// Starts a fresh active session. Exam sessions expire `duration` after
    /// `started_at`; practice sessions never expire.
    #[must_use]
    pub fn start(
        id: SessionId,
        user_id: UserId,
        exam_id: ExamId,
        mode: SessionMode,
        started_at: DateTime<Utc>,
        duration: Duration,
        total_count: u32,
    ) -> Self {
        let expires_at = match mode {
            SessionMode::Exam => Some(started_at + duration),
            SessionMode::Practice => None,
        };
        Self {
            id,
            user_id,
            exam_id,
            mode,
            status: SessionStatus::Active,
            started_at,
            expires_at,
            finished_at: None,
            current_index: 1,
            total_count,
            warn10_sent: false,
            warn5_sent: false,
            warn1_sent: false,
            correct_count: None,
            score_percent: None,
        }
    }

    /// Rehydrates a session from storage, re-validating its invariants.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError` if the expiry does not match the mode, the
    /// current index falls outside `1..=total_count`, or a terminal session
    /// lacks its finish timestamp.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: SessionId,
        user_id: UserId,
        exam_id: ExamId,
        mode: SessionMode,
        status: SessionStatus,
        started_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
        finished_at: Option<DateTime<Utc>>,
        current_index: u32,
        total_count: u32,
        warnings_sent: (bool, bool, bool),
        correct_count: Option<u32>,
        score_percent: Option<u32>,
    ) -> Result<Self, SessionStateError> {
        if expires_at.is_some() != matches!(mode, SessionMode::Exam) {
            return Err(SessionStateError::ExpiryModeMismatch);
        }
        if total_count == 0 {
            return Err(SessionStateError::EmptyQuestionSet);
        }
        if current_index < 1 || current_index > total_count {
            return Err(SessionStateError::IndexOutOfRange {
                index: current_index,
                total: total_count,
            });
        }
        if status.is_terminal() && finished_at.is_none() {
            return Err(SessionStateError::MissingFinishTimestamp);
        }
        let (warn10_sent, warn5_sent, warn1_sent) = warnings_sent;
        Ok(Self {
            id,
            user_id,
            exam_id,
            mode,
            status,
            started_at,
            expires_at,
            finished_at,
            current_index,
            total_count,
            warn10_sent,
            warn5_sent,
            warn1_sent,
            correct_count,
            score_percent,
        })
    }

    // ─── Accessors ─────────────────────────────────────────────────────────

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn exam_id(&self) -> ExamId {
        self.exam_id
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    #[must_use]
    pub fn current_index(&self) -> u32 {
        self.current_index
    }

    #[must_use]
    pub fn total_count(&self) -> u32 {
        self.total_count
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    #[must_use]
    pub fn correct_count(&self) -> Option<u32> {
        self.correct_count
    }

    #[must_use]
    pub fn score_percent(&self) -> Option<u32> {
        self.score_percent
    }

    #[must_use]
    pub fn warning_sent(&self, kind: WarningKind) -> bool {
        match kind {
            WarningKind::TenMinutes => self.warn10_sent,
            WarningKind::FiveMinutes => self.warn5_sent,
            WarningKind::OneMinute => self.warn1_sent,
        }
    }

    // ─── Timing ────────────────────────────────────────────────────────────

    /// Whole seconds until expiry, clamped at zero.
    ///
    /// `None` for practice sessions and for sessions no longer active.
    #[must_use]
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        if !self.is_active() {
            return None;
        }
        let expires_at = self.expires_at?;
        Some((expires_at - now).num_seconds().max(0))
    }

    /// The warning that should fire now, if any.
    ///
    /// Thresholds are evaluated tightest-first (1 min, then 5, then 10)
    /// against the corresponding not-yet-sent flag, so a monitor that slept
    /// through several boundaries raises only the most urgent one.
    /// Zero remaining time is the auto-submit case, not a warning.
    #[must_use]
    pub fn due_warning(&self, now: DateTime<Utc>) -> Option<WarningKind> {
        let remaining = self.remaining_seconds(now)?;
        if remaining <= 0 {
            return None;
        }
        for kind in [
            WarningKind::OneMinute,
            WarningKind::FiveMinutes,
            WarningKind::TenMinutes,
        ] {
            if remaining <= kind.threshold_seconds() && !self.warning_sent(kind) {
                return Some(kind);
            }
        }
        None
    }

    // ─── Transitions ───────────────────────────────────────────────────────

    /// Moves the current question pointer, clamping into `1..=total_count`.
    pub fn set_current_index(&mut self, index: u32) -> u32 {
        self.current_index = index.clamp(1, self.total_count);
        self.current_index
    }

    /// Marks a warning as sent. Flags only ever move from unset to set.
    pub fn mark_warning_sent(&mut self, kind: WarningKind) {
        match kind {
            WarningKind::TenMinutes => self.warn10_sent = true,
            WarningKind::FiveMinutes => self.warn5_sent = true,
            WarningKind::OneMinute => self.warn1_sent = true,
        }
    }

    /// Finalizes an active session as submitted, recording the grade.
    ///
    /// Returns `false` (and changes nothing) if the session is already
    /// terminal; the caller lost the submission race.
    pub fn submit(&mut self, finished_at: DateTime<Utc>, correct: u32, percent: u32) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = SessionStatus::Submitted;
        self.finished_at = Some(finished_at);
        self.correct_count = Some(correct);
        self.score_percent = Some(percent);
        true
    }

    /// Moves an active session to `Expired` (user abandon or practice
    /// restart). Returns `false` if the session is already terminal.
    pub fn expire(&mut self, finished_at: DateTime<Utc>) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = SessionStatus::Expired;
        self.finished_at = Some(finished_at);
        true
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────
