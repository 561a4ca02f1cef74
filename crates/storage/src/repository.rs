use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use exam_core::model::{
    AnswerId, AnswerOption, Question, QuestionId, Section, Session, SessionId, UserId, WarningKind,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Binding of one question to one position inside one session.
///
/// Exactly `total_count` of these exist per session; positions are a
/// contiguous permutation of `1..=total_count` and question ids are pairwise
/// distinct within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionQuestionRow {
    pub session_id: SessionId,
    pub question_id: QuestionId,
    /// 1-based position in the session.
    pub index: u32,
    pub flagged: bool,
}

/// Aggregate progress counters for one session. "Answered" means at least
/// one selected option, regardless of correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounts {
    pub answered: u32,
    pub flagged: u32,
    pub total: u32,
}

/// Per-position display state for the review board; a flag wins over a
/// recorded answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionState {
    Unanswered,
    Answered,
    Flagged,
}

/// Durable state for sessions, their question bindings, chosen answers and
/// warning flags.
///
/// Compound mutations (`insert_session`, `replace_answer`, `toggle_answer`,
/// `finalize_submission`) are each one atomic unit: a concurrent reader never
/// observes a half-written state, and a failure rolls the whole operation
/// back.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a new session together with all of its question rows,
    /// all-or-nothing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the session id already exists.
    async fn insert_session(
        &self,
        session: &Session,
        questions: &[SessionQuestionRow],
    ) -> Result<(), StorageError>;

    /// Fetch a session by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn session(&self, id: SessionId) -> Result<Session, StorageError>;

    /// The user's most recently started session still in `active` status,
    /// if any.
    async fn active_session_for_user(&self, user: UserId)
    -> Result<Option<Session>, StorageError>;

    /// All active timed exam sessions (the expiry monitor's scan set).
    async fn active_exam_sessions(&self) -> Result<Vec<Session>, StorageError>;

    /// Persist the current-question pointer. Callers clamp; the store writes
    /// what it is given.
    async fn set_current_index(&self, id: SessionId, index: u32) -> Result<(), StorageError>;

    /// The question binding at a 1-based position.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session or position is absent.
    async fn question_at(
        &self,
        id: SessionId,
        index: u32,
    ) -> Result<SessionQuestionRow, StorageError>;

    /// All question bindings of the session, ordered by position.
    async fn question_rows(&self, id: SessionId) -> Result<Vec<SessionQuestionRow>, StorageError>;

    /// Set or clear the advisory flag at a position.
    async fn set_flag(&self, id: SessionId, index: u32, flagged: bool) -> Result<(), StorageError>;

    /// Clear every flag of the session.
    async fn clear_all_flags(&self, id: SessionId) -> Result<(), StorageError>;

    /// Single-choice recording: drop any previous selection for the question
    /// and insert exactly one row, in one transaction.
    async fn replace_answer(
        &self,
        id: SessionId,
        question: QuestionId,
        answer: AnswerId,
    ) -> Result<(), StorageError>;

    /// Multi-choice toggling as a conditional set-membership operation:
    /// remove the row if present, insert it otherwise, in one transaction.
    /// Returns whether the option is selected afterwards.
    async fn toggle_answer(
        &self,
        id: SessionId,
        question: QuestionId,
        answer: AnswerId,
    ) -> Result<bool, StorageError>;

    /// Selected option ids for one question, ascending by id.
    async fn selected_answer_ids(
        &self,
        id: SessionId,
        question: QuestionId,
    ) -> Result<Vec<AnswerId>, StorageError>;

    /// Remove selections for one question, or for the whole session when
    /// `question` is `None`. Flags and status are untouched.
    async fn clear_answers(
        &self,
        id: SessionId,
        question: Option<QuestionId>,
    ) -> Result<(), StorageError>;

    /// Progress counters for the session.
    async fn progress(&self, id: SessionId) -> Result<ProgressCounts, StorageError>;

    /// Per-position states in position order.
    async fn answer_board(&self, id: SessionId) -> Result<Vec<QuestionState>, StorageError>;

    /// Terminal transition to `submitted`, conditional on the session still
    /// being active; records the grade and, when this call wins and
    /// `mark_user_failed` is set, stamps the owner's failure timestamp in the
    /// same transaction. Returns whether this call won the transition.
    async fn finalize_submission(
        &self,
        id: SessionId,
        finished_at: DateTime<Utc>,
        correct: u32,
        percent: u32,
        mark_user_failed: bool,
    ) -> Result<bool, StorageError>;

    /// Terminal transition to `expired`, conditional on the session still
    /// being active. Returns whether the transition happened.
    async fn mark_expired(
        &self,
        id: SessionId,
        finished_at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// Record that a warning threshold notification went out. Monotonic:
    /// flags are only ever set.
    async fn set_warning_sent(&self, id: SessionId, kind: WarningKind)
    -> Result<(), StorageError>;
}

/// Read access to the question bank.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Fetch one question.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn question(&self, id: QuestionId) -> Result<Question, StorageError>;

    /// All options of a question, by presentation order.
    async fn answers_for_question(
        &self,
        id: QuestionId,
    ) -> Result<Vec<AnswerOption>, StorageError>;

    /// Ids of the correct options, ascending: the stable comparison order
    /// used when grading.
    async fn correct_answer_ids(&self, id: QuestionId) -> Result<Vec<AnswerId>, StorageError>;

    /// Ids of all active questions in a section (the selector's draw pool).
    async fn active_ids_by_section(
        &self,
        section: Section,
    ) -> Result<Vec<QuestionId>, StorageError>;

    /// Number of active questions in a section.
    async fn count_active_by_section(&self, section: Section) -> Result<u32, StorageError>;

    /// Insert a question with its options (seeding and tests).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the question id already exists.
    async fn insert_question(
        &self,
        question: &Question,
        options: &[AnswerOption],
    ) -> Result<(), StorageError>;
}

/// The slice of user state this core touches: the failure-cooldown anchor.
/// Identity and profile data belong to the transport layer above.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Make sure a user row exists (no-op when it already does).
    async fn ensure_user(&self, id: UserId) -> Result<(), StorageError>;

    /// Stamp the failure-cooldown anchor.
    async fn record_failure(&self, id: UserId, at: DateTime<Utc>) -> Result<(), StorageError>;

    /// The user's most recent failure timestamp, if any.
    async fn last_failure(&self, id: UserId) -> Result<Option<DateTime<Utc>>, StorageError>;
}

/// Aggregates the three repositories behind trait objects for easy backend
/// swapping.
#[derive(Clone)]
pub struct Storage {
    pub sessions: Arc<dyn SessionRepository>,
    pub questions: Arc<dyn QuestionRepository>,
    pub users: Arc<dyn UserRepository>,
}

impl Storage {
    /// Build a `Storage` backed by the in-memory fake.
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = crate::memory::InMemoryRepository::new();
        Self {
            sessions: Arc::new(repo.clone()),
            questions: Arc::new(repo.clone()),
            users: Arc::new(repo),
        }
    }
}
