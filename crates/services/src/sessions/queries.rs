//! Read paths of the session engine. None of these mutate state, and all of
//! them remain available on terminal sessions (result review).

use exam_core::model::{AnswerId, QuestionId, Session, SessionId, UserId};
use storage::repository::{ProgressCounts, QuestionState, SessionQuestionRow};

use super::engine::SessionEngine;
use crate::error::EngineError;

impl SessionEngine {
    /// Fetch a session by id.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    pub async fn get_session(&self, id: SessionId) -> Result<Session, EngineError> {
        self.load(id).await
    }

    /// The user's current active session, if any.
    ///
    /// # Errors
    ///
    /// Storage errors only; no active session is `Ok(None)`.
    pub async fn get_active_session(&self, user: UserId) -> Result<Option<Session>, EngineError> {
        Ok(self.sessions().active_session_for_user(user).await?)
    }

    /// The question binding at a 1-based position.
    ///
    /// # Errors
    ///
    /// `NotFound` when the session or position is absent.
    pub async fn get_question_at(
        &self,
        id: SessionId,
        index: u32,
    ) -> Result<SessionQuestionRow, EngineError> {
        self.sessions()
            .question_at(id, index)
            .await
            .map_err(EngineError::from_lookup)
    }

    /// Selected option ids for one question, ascending by id: the stable
    /// order correctness checks compare against.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown sessions.
    pub async fn selected_answer_ids(
        &self,
        id: SessionId,
        question: QuestionId,
    ) -> Result<Vec<AnswerId>, EngineError> {
        self.sessions()
            .selected_answer_ids(id, question)
            .await
            .map_err(EngineError::from_lookup)
    }

    /// Progress counters: answered (≥1 selection, correctness irrelevant),
    /// flagged, total.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown sessions.
    pub async fn progress(&self, id: SessionId) -> Result<ProgressCounts, EngineError> {
        self.sessions()
            .progress(id)
            .await
            .map_err(EngineError::from_lookup)
    }

    /// Per-position answer states in position order, for the review board.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown sessions.
    pub async fn answer_board(&self, id: SessionId) -> Result<Vec<QuestionState>, EngineError> {
        self.sessions()
            .answer_board(id)
            .await
            .map_err(EngineError::from_lookup)
    }

    /// Whole seconds until expiry: `None` for practice sessions and for
    /// sessions no longer active, otherwise `max(0, expires_at − now)`.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown sessions.
    pub async fn remaining_seconds(&self, id: SessionId) -> Result<Option<i64>, EngineError> {
        let session = self.load(id).await?;
        Ok(session.remaining_seconds(self.clock().now()))
    }
}
