use std::sync::Arc;

use chrono::Duration;

use exam_core::Clock;
use exam_core::model::{
    AnswerId, ExamId, GradeResult, QuestionId, Session, SessionId, SessionMode, SessionStatus,
    SubmitOutcome, UserId,
};
use exam_core::policy;
use storage::repository::{
    SessionQuestionRow, SessionRepository, Storage, UserRepository,
};

use crate::error::EngineError;
use crate::scoring::ScoringService;
use crate::selection::Selector;

/// Owns the session lifecycle state machine and every mutation of a
/// session's answers, flags and pointer.
///
/// One logical authority per session is assumed: mutations are serialized by
/// the store, not by in-process locks.
#[derive(Clone)]
pub struct SessionEngine {
    clock: Clock,
    sessions: Arc<dyn SessionRepository>,
    users: Arc<dyn UserRepository>,
    selector: Selector,
    scorer: ScoringService,
    exam_duration: Duration,
}

impl SessionEngine {
    #[must_use]
    pub fn new(clock: Clock, storage: &Storage) -> Self {
        Self {
            clock,
            sessions: storage.sessions.clone(),
            users: storage.users.clone(),
            selector: Selector::new(storage.questions.clone()),
            scorer: ScoringService::new(storage.sessions.clone(), storage.questions.clone()),
            exam_duration: policy::exam_duration(),
        }
    }

    /// Override the exam window (tests, shorter practice exams).
    #[must_use]
    pub fn with_exam_duration(mut self, duration: Duration) -> Self {
        self.exam_duration = duration;
        self
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub(crate) fn sessions(&self) -> &Arc<dyn SessionRepository> {
        &self.sessions
    }

    pub(crate) async fn load(&self, id: SessionId) -> Result<Session, EngineError> {
        self.sessions.session(id).await.map_err(EngineError::from_lookup)
    }

    /// Loads a session and rejects terminal ones. All mutations run through
    /// this guard: once a session is submitted or expired, its answers and
    /// flags are frozen, which keeps replayed grading deterministic.
    async fn load_active(&self, id: SessionId) -> Result<Session, EngineError> {
        let session = self.load(id).await?;
        if !session.is_active() {
            return Err(EngineError::InvalidState("session is not active"));
        }
        Ok(session)
    }

    // ─── Lifecycle ─────────────────────────────────────────────────────────

    /// Start a new session for a user.
    ///
    /// The one-active-session-per-user rule is enforced by lookup-then-create;
    /// two racing creations can slip through the window, which is accepted
    /// (a duplicate active session is a usability bug, not data corruption:
    /// each session stays independently consistent).
    ///
    /// # Errors
    ///
    /// `ActiveSessionExists` when the user already has an active session,
    /// `InsufficientPool` when a section cannot fill its quota, storage
    /// errors otherwise. The session row and its question bindings are
    /// persisted as one atomic unit.
    pub async fn create_session(
        &self,
        user: UserId,
        exam: ExamId,
        mode: SessionMode,
    ) -> Result<Session, EngineError> {
        if self.sessions.active_session_for_user(user).await?.is_some() {
            return Err(EngineError::ActiveSessionExists);
        }

        let ids = self.selector.select_question_ids().await?;
        self.users.ensure_user(user).await?;

        let session = Session::start(
            SessionId::generate(),
            user,
            exam,
            mode,
            self.clock.now(),
            self.exam_duration,
            policy::TOTAL_QUESTIONS,
        );
        let rows: Vec<SessionQuestionRow> = ids
            .iter()
            .enumerate()
            .map(|(i, question_id)| SessionQuestionRow {
                session_id: session.id(),
                question_id: *question_id,
                index: u32::try_from(i + 1).unwrap_or(u32::MAX),
                flagged: false,
            })
            .collect();
        self.sessions.insert_session(&session, &rows).await?;

        tracing::info!(session_id = %session.id(), user_id = %user, mode = %mode, "session created");
        Ok(session)
    }

    /// Abandon an active session, moving it to `expired`.
    ///
    /// # Errors
    ///
    /// `InvalidState` when the session is already terminal.
    pub async fn abandon(&self, id: SessionId) -> Result<(), EngineError> {
        self.load(id).await?;
        if !self.sessions.mark_expired(id, self.clock.now()).await? {
            return Err(EngineError::InvalidState("session is already finished"));
        }
        tracing::info!(session_id = %id, "session abandoned");
        Ok(())
    }

    /// Expire a practice session and start a fresh one for the same user and
    /// exam.
    ///
    /// # Errors
    ///
    /// `InvalidState` for non-practice sessions.
    pub async fn restart_practice(&self, id: SessionId) -> Result<Session, EngineError> {
        let session = self.load(id).await?;
        if session.mode() != SessionMode::Practice {
            return Err(EngineError::InvalidState(
                "restart is allowed only for practice sessions",
            ));
        }
        self.sessions.mark_expired(id, self.clock.now()).await?;
        self.create_session(session.user_id(), session.exam_id(), SessionMode::Practice)
            .await
    }

    /// Grade the session and move it to `submitted`. The same path serves
    /// user-triggered submits and the expiry monitor's auto-submit.
    ///
    /// Idempotent: a repeated call on an already-submitted session replays
    /// the stored result (answers are frozen once terminal, so re-reading
    /// them reproduces it) without re-applying the pass/fail side effects.
    /// When two callers race, the conditional terminal transition picks the
    /// winner; the loser observes `InvalidState` and discards its result.
    ///
    /// # Errors
    ///
    /// `InvalidState` for practice sessions, abandoned sessions and race
    /// losers; `NotFound` for unknown ids.
    pub async fn finalize_and_submit(
        &self,
        id: SessionId,
        pass_percent: u32,
    ) -> Result<SubmitOutcome, EngineError> {
        let session = self.load(id).await?;
        if session.mode() != SessionMode::Exam {
            return Err(EngineError::InvalidState(
                "only exam sessions can be submitted",
            ));
        }
        match session.status() {
            SessionStatus::Submitted => {
                let result = self.scorer.grade(id).await?;
                let passed = result.percent >= pass_percent;
                return Ok(SubmitOutcome { result, passed });
            }
            SessionStatus::Expired => {
                return Err(EngineError::InvalidState(
                    "session was abandoned or expired",
                ));
            }
            SessionStatus::Active => {}
        }

        let result = self.scorer.grade(id).await?;
        let passed = result.percent >= pass_percent;
        let won = self
            .sessions
            .finalize_submission(id, self.clock.now(), result.correct, result.percent, !passed)
            .await?;
        if !won {
            return Err(EngineError::InvalidState(
                "session was finalized concurrently",
            ));
        }

        tracing::info!(session_id = %id, percent = result.percent, passed, "session submitted");
        Ok(SubmitOutcome { result, passed })
    }

    /// Read-only grading (practice review, result re-display).
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown sessions, storage errors otherwise.
    pub async fn grade(&self, id: SessionId) -> Result<GradeResult, EngineError> {
        self.scorer.grade(id).await
    }

    // ─── Mutations ─────────────────────────────────────────────────────────

    /// Move the current-question pointer, clamped into `1..=total_count`.
    /// Returns the pointer actually stored. No other side effects.
    ///
    /// # Errors
    ///
    /// `InvalidState` for terminal sessions.
    pub async fn set_current_index(&self, id: SessionId, index: u32) -> Result<u32, EngineError> {
        let session = self.load_active(id).await?;
        let clamped = index.clamp(1, session.total_count());
        self.sessions.set_current_index(id, clamped).await?;
        Ok(clamped)
    }

    /// Flip the review flag at a position and return the new state.
    ///
    /// Flags are advisory UI state, never scored; the read-modify-write here
    /// is last-writer-wins under concurrency.
    ///
    /// # Errors
    ///
    /// `NotFound` when the position does not exist, `InvalidState` for
    /// terminal sessions.
    pub async fn toggle_flag(&self, id: SessionId, index: u32) -> Result<bool, EngineError> {
        self.load_active(id).await?;
        let row = self
            .sessions
            .question_at(id, index)
            .await
            .map_err(EngineError::from_lookup)?;
        let flagged = !row.flagged;
        self.sessions.set_flag(id, index, flagged).await?;
        Ok(flagged)
    }

    /// Clear every review flag of the session.
    ///
    /// # Errors
    ///
    /// `InvalidState` for terminal sessions.
    pub async fn clear_all_flags(&self, id: SessionId) -> Result<(), EngineError> {
        self.load_active(id).await?;
        self.sessions.clear_all_flags(id).await?;
        Ok(())
    }

    /// Record the answer of a single-choice question, replacing whatever was
    /// selected before. One transaction: a concurrent read never observes
    /// zero selections for an answered question.
    ///
    /// # Errors
    ///
    /// `InvalidState` for terminal sessions.
    pub async fn record_single_choice(
        &self,
        id: SessionId,
        question: QuestionId,
        answer: AnswerId,
    ) -> Result<(), EngineError> {
        self.load_active(id).await?;
        self.sessions.replace_answer(id, question, answer).await?;
        Ok(())
    }

    /// Toggle one option of a multi-choice question and return whether it is
    /// selected afterwards. Toggling the same option twice restores the
    /// original selection set.
    ///
    /// # Errors
    ///
    /// `InvalidState` for terminal sessions.
    pub async fn toggle_multi_choice(
        &self,
        id: SessionId,
        question: QuestionId,
        answer: AnswerId,
    ) -> Result<bool, EngineError> {
        self.load_active(id).await?;
        Ok(self.sessions.toggle_answer(id, question, answer).await?)
    }

    /// Clear the selections of one question, or of the whole session when
    /// `question` is `None`. Flags and status are untouched.
    ///
    /// # Errors
    ///
    /// `InvalidState` for terminal sessions.
    pub async fn reset_answers(
        &self,
        id: SessionId,
        question: Option<QuestionId>,
    ) -> Result<(), EngineError> {
        self.load_active(id).await?;
        self.sessions.clear_answers(id, question).await?;
        Ok(())
    }
}
