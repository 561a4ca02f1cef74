use std::sync::Arc;

use exam_core::model::{GradeResult, QuestionId, Section, SectionStats, SessionId, percent_of};
use storage::repository::{QuestionRepository, SessionRepository};

use crate::error::EngineError;

/// Grades stored answers against the bank's answer key.
#[derive(Clone)]
pub struct ScoringService {
    sessions: Arc<dyn SessionRepository>,
    questions: Arc<dyn QuestionRepository>,
}

fn section_slot(section: Section) -> usize {
    match section {
        Section::Objects => 0,
        Section::Classes => 1,
        Section::Builtins => 2,
        Section::AdvFunc => 3,
    }
}

impl ScoringService {
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        questions: Arc<dyn QuestionRepository>,
    ) -> Self {
        Self {
            sessions,
            questions,
        }
    }

    /// Compute the aggregate and per-section result for one session.
    ///
    /// Reads only; callable any number of times with identical output as
    /// long as the stored answers do not change.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` if the session is unknown, and
    /// storage errors otherwise.
    pub async fn grade(&self, session_id: SessionId) -> Result<GradeResult, EngineError> {
        let rows = self
            .sessions
            .question_rows(session_id)
            .await
            .map_err(EngineError::from_lookup)?;

        let mut by_section = Section::ALL.map(|section| SectionStats {
            section,
            total: 0,
            correct: 0,
        });
        let mut correct_count = 0_u32;

        for row in &rows {
            let question = self
                .questions
                .question(row.question_id)
                .await
                .map_err(EngineError::from_lookup)?;
            let slot = &mut by_section[section_slot(question.section)];
            slot.total += 1;
            if self.is_question_correct(session_id, row.question_id).await? {
                correct_count += 1;
                slot.correct += 1;
            }
        }

        let total = u32::try_from(rows.len()).unwrap_or(u32::MAX);
        Ok(GradeResult {
            total,
            correct: correct_count,
            percent: percent_of(correct_count, total),
            by_section: by_section.to_vec(),
        })
    }

    /// A question counts correct iff the chosen option-id set equals the
    /// correct option-id set exactly (both compared in ascending order).
    /// No partial credit; an unanswered question is always incorrect, as is
    /// a question whose key is somehow empty.
    ///
    /// # Errors
    ///
    /// Returns storage errors; a missing session surfaces as `NotFound`.
    pub async fn is_question_correct(
        &self,
        session_id: SessionId,
        question_id: QuestionId,
    ) -> Result<bool, EngineError> {
        let correct = self.questions.correct_answer_ids(question_id).await?;
        let chosen = self
            .sessions
            .selected_answer_ids(session_id, question_id)
            .await
            .map_err(EngineError::from_lookup)?;

        Ok(!correct.is_empty() && correct == chosen)
    }
}
