use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use exam_core::model::{
    AnswerId, AnswerOption, Question, QuestionId, Section, Session, SessionId, UserId, WarningKind,
};

use crate::repository::{
    ProgressCounts, QuestionRepository, QuestionState, SessionQuestionRow, SessionRepository,
    StorageError, UserRepository,
};

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, Session>,
    // kept sorted by position
    session_questions: HashMap<SessionId, Vec<SessionQuestionRow>>,
    // (question, answer) pairs; BTreeSet keeps ids in ascending order
    selections: HashMap<SessionId, BTreeSet<(QuestionId, AnswerId)>>,
    questions: HashMap<QuestionId, Question>,
    options: HashMap<QuestionId, Vec<AnswerOption>>,
    users: HashMap<UserId, Option<DateTime<Utc>>>,
}

/// In-memory repository implementation for tests and prototyping.
///
/// A single mutex over the whole state stands in for the store's
/// transactional guarantees: every compound operation below runs under one
/// lock acquisition, so readers never observe a half-applied mutation.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StorageError> {
        self.inner
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn insert_session(
        &self,
        session: &Session,
        questions: &[SessionQuestionRow],
    ) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        if inner.sessions.contains_key(&session.id()) {
            return Err(StorageError::Conflict);
        }
        let mut rows = questions.to_vec();
        rows.sort_by_key(|row| row.index);
        inner.sessions.insert(session.id(), session.clone());
        inner.session_questions.insert(session.id(), rows);
        inner.selections.insert(session.id(), BTreeSet::new());
        Ok(())
    }

    async fn session(&self, id: SessionId) -> Result<Session, StorageError> {
        let inner = self.lock()?;
        inner.sessions.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn active_session_for_user(
        &self,
        user: UserId,
    ) -> Result<Option<Session>, StorageError> {
        let inner = self.lock()?;
        Ok(inner
            .sessions
            .values()
            .filter(|s| s.user_id() == user && s.is_active())
            .max_by_key(|s| s.started_at())
            .cloned())
    }

    async fn active_exam_sessions(&self) -> Result<Vec<Session>, StorageError> {
        let inner = self.lock()?;
        let mut sessions: Vec<Session> = inner
            .sessions
            .values()
            .filter(|s| s.is_active() && s.expires_at().is_some())
            .cloned()
            .collect();
        sessions.sort_by_key(Session::started_at);
        Ok(sessions)
    }

    async fn set_current_index(&self, id: SessionId, index: u32) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        let session = inner.sessions.get_mut(&id).ok_or(StorageError::NotFound)?;
        session.set_current_index(index);
        Ok(())
    }

    async fn question_at(
        &self,
        id: SessionId,
        index: u32,
    ) -> Result<SessionQuestionRow, StorageError> {
        let inner = self.lock()?;
        inner
            .session_questions
            .get(&id)
            .and_then(|rows| rows.iter().find(|row| row.index == index))
            .copied()
            .ok_or(StorageError::NotFound)
    }

    async fn question_rows(&self, id: SessionId) -> Result<Vec<SessionQuestionRow>, StorageError> {
        let inner = self.lock()?;
        inner
            .session_questions
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn set_flag(&self, id: SessionId, index: u32, flagged: bool) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        let row = inner
            .session_questions
            .get_mut(&id)
            .and_then(|rows| rows.iter_mut().find(|row| row.index == index))
            .ok_or(StorageError::NotFound)?;
        row.flagged = flagged;
        Ok(())
    }

    async fn clear_all_flags(&self, id: SessionId) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        let rows = inner
            .session_questions
            .get_mut(&id)
            .ok_or(StorageError::NotFound)?;
        for row in rows.iter_mut() {
            row.flagged = false;
        }
        Ok(())
    }

    async fn replace_answer(
        &self,
        id: SessionId,
        question: QuestionId,
        answer: AnswerId,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        let selections = inner.selections.get_mut(&id).ok_or(StorageError::NotFound)?;
        selections.retain(|(q, _)| *q != question);
        selections.insert((question, answer));
        Ok(())
    }

    async fn toggle_answer(
        &self,
        id: SessionId,
        question: QuestionId,
        answer: AnswerId,
    ) -> Result<bool, StorageError> {
        let mut inner = self.lock()?;
        let selections = inner.selections.get_mut(&id).ok_or(StorageError::NotFound)?;
        let key = (question, answer);
        if selections.remove(&key) {
            Ok(false)
        } else {
            selections.insert(key);
            Ok(true)
        }
    }

    async fn selected_answer_ids(
        &self,
        id: SessionId,
        question: QuestionId,
    ) -> Result<Vec<AnswerId>, StorageError> {
        let inner = self.lock()?;
        Ok(inner
            .selections
            .get(&id)
            .into_iter()
            .flatten()
            .filter(|(q, _)| *q == question)
            .map(|(_, a)| *a)
            .collect())
    }

    async fn clear_answers(
        &self,
        id: SessionId,
        question: Option<QuestionId>,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        let selections = inner.selections.get_mut(&id).ok_or(StorageError::NotFound)?;
        match question {
            Some(question) => selections.retain(|(q, _)| *q != question),
            None => selections.clear(),
        }
        Ok(())
    }

    async fn progress(&self, id: SessionId) -> Result<ProgressCounts, StorageError> {
        let inner = self.lock()?;
        let session = inner.sessions.get(&id).ok_or(StorageError::NotFound)?;
        let rows = inner
            .session_questions
            .get(&id)
            .ok_or(StorageError::NotFound)?;
        let selections = inner.selections.get(&id).ok_or(StorageError::NotFound)?;

        let answered = rows
            .iter()
            .filter(|row| selections.iter().any(|(q, _)| *q == row.question_id))
            .count();
        let flagged = rows.iter().filter(|row| row.flagged).count();
        Ok(ProgressCounts {
            answered: u32::try_from(answered).unwrap_or(u32::MAX),
            flagged: u32::try_from(flagged).unwrap_or(u32::MAX),
            total: session.total_count(),
        })
    }

    async fn answer_board(&self, id: SessionId) -> Result<Vec<QuestionState>, StorageError> {
        let inner = self.lock()?;
        let rows = inner
            .session_questions
            .get(&id)
            .ok_or(StorageError::NotFound)?;
        let selections = inner.selections.get(&id).ok_or(StorageError::NotFound)?;
        Ok(rows
            .iter()
            .map(|row| {
                if row.flagged {
                    QuestionState::Flagged
                } else if selections.iter().any(|(q, _)| *q == row.question_id) {
                    QuestionState::Answered
                } else {
                    QuestionState::Unanswered
                }
            })
            .collect())
    }

    async fn finalize_submission(
        &self,
        id: SessionId,
        finished_at: DateTime<Utc>,
        correct: u32,
        percent: u32,
        mark_user_failed: bool,
    ) -> Result<bool, StorageError> {
        let mut inner = self.lock()?;
        let user = {
            let session = inner.sessions.get_mut(&id).ok_or(StorageError::NotFound)?;
            if !session.submit(finished_at, correct, percent) {
                return Ok(false);
            }
            session.user_id()
        };
        if mark_user_failed {
            inner.users.insert(user, Some(finished_at));
        }
        Ok(true)
    }

    async fn mark_expired(
        &self,
        id: SessionId,
        finished_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut inner = self.lock()?;
        let session = inner.sessions.get_mut(&id).ok_or(StorageError::NotFound)?;
        Ok(session.expire(finished_at))
    }

    async fn set_warning_sent(
        &self,
        id: SessionId,
        kind: WarningKind,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        let session = inner.sessions.get_mut(&id).ok_or(StorageError::NotFound)?;
        session.mark_warning_sent(kind);
        Ok(())
    }
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn question(&self, id: QuestionId) -> Result<Question, StorageError> {
        let inner = self.lock()?;
        inner.questions.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn answers_for_question(
        &self,
        id: QuestionId,
    ) -> Result<Vec<AnswerOption>, StorageError> {
        let inner = self.lock()?;
        Ok(inner.options.get(&id).cloned().unwrap_or_default())
    }

    async fn correct_answer_ids(&self, id: QuestionId) -> Result<Vec<AnswerId>, StorageError> {
        let inner = self.lock()?;
        let mut ids: Vec<AnswerId> = inner
            .options
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .filter(|o| o.is_correct)
            .map(|o| o.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn active_ids_by_section(
        &self,
        section: Section,
    ) -> Result<Vec<QuestionId>, StorageError> {
        let inner = self.lock()?;
        let mut ids: Vec<QuestionId> = inner
            .questions
            .values()
            .filter(|q| q.is_active && q.section == section)
            .map(|q| q.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn count_active_by_section(&self, section: Section) -> Result<u32, StorageError> {
        let ids = self.active_ids_by_section(section).await?;
        Ok(u32::try_from(ids.len()).unwrap_or(u32::MAX))
    }

    async fn insert_question(
        &self,
        question: &Question,
        options: &[AnswerOption],
    ) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        if inner.questions.contains_key(&question.id) {
            return Err(StorageError::Conflict);
        }
        let mut options = options.to_vec();
        options.sort_by_key(|o| o.order_index);
        inner.questions.insert(question.id, question.clone());
        inner.options.insert(question.id, options);
        Ok(())
    }
}

#[async_trait]
impl UserRepository for InMemoryRepository {
    async fn ensure_user(&self, id: UserId) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        inner.users.entry(id).or_insert(None);
        Ok(())
    }

    async fn record_failure(&self, id: UserId, at: DateTime<Utc>) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        inner.users.insert(id, Some(at));
        Ok(())
    }

    async fn last_failure(&self, id: UserId) -> Result<Option<DateTime<Utc>>, StorageError> {
        let inner = self.lock()?;
        Ok(inner.users.get(&id).copied().flatten())
    }
}
