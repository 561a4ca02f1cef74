use chrono::{DateTime, Utc};
use sqlx::Row;

use exam_core::model::{AnswerId, QuestionId, Session, SessionId, UserId, WarningKind};

use super::SqliteRepository;
use super::mapping::{conn_err, map_exec_err, map_session_row};
use crate::repository::{
    ProgressCounts, QuestionState, SessionQuestionRow, SessionRepository, StorageError,
};

const SESSION_COLUMNS: &str = "id, user_id, exam_id, mode, status, started_at, expires_at, \
     finished_at, current_index, total_count, warn10_sent, warn5_sent, warn1_sent, \
     correct_count, score_percent";

fn warn_column(kind: WarningKind) -> &'static str {
    match kind {
        WarningKind::TenMinutes => "warn10_sent",
        WarningKind::FiveMinutes => "warn5_sent",
        WarningKind::OneMinute => "warn1_sent",
    }
}

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn insert_session(
        &self,
        session: &Session,
        questions: &[SessionQuestionRow],
    ) -> Result<(), StorageError> {
        let mut tx = self.pool().begin().await.map_err(conn_err)?;

        sqlx::query(
            r"
            INSERT INTO exam_sessions (
                id, user_id, exam_id, mode, status, started_at, expires_at, finished_at,
                current_index, total_count, warn10_sent, warn5_sent, warn1_sent,
                correct_count, score_percent
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ",
        )
        .bind(session.id().to_string())
        .bind(session.user_id().value())
        .bind(session.exam_id().value())
        .bind(session.mode().as_str())
        .bind(session.status().as_str())
        .bind(session.started_at())
        .bind(session.expires_at())
        .bind(session.finished_at())
        .bind(i64::from(session.current_index()))
        .bind(i64::from(session.total_count()))
        .bind(session.warning_sent(WarningKind::TenMinutes))
        .bind(session.warning_sent(WarningKind::FiveMinutes))
        .bind(session.warning_sent(WarningKind::OneMinute))
        .bind(session.correct_count().map(i64::from))
        .bind(session.score_percent().map(i64::from))
        .execute(&mut *tx)
        .await
        .map_err(map_exec_err)?;

        for row in questions {
            sqlx::query(
                r"
                INSERT INTO session_questions (session_id, question_id, q_index, flagged)
                VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(row.session_id.to_string())
            .bind(row.question_id.value())
            .bind(i64::from(row.index))
            .bind(row.flagged)
            .execute(&mut *tx)
            .await
            .map_err(map_exec_err)?;
        }

        tx.commit().await.map_err(conn_err)
    }

    async fn session(&self, id: SessionId) -> Result<Session, StorageError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM exam_sessions WHERE id = ?1 LIMIT 1");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await
            .map_err(conn_err)?
            .ok_or(StorageError::NotFound)?;
        map_session_row(&row)
    }

    async fn active_session_for_user(
        &self,
        user: UserId,
    ) -> Result<Option<Session>, StorageError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM exam_sessions
             WHERE user_id = ?1 AND status = 'active'
             ORDER BY started_at DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(user.value())
            .fetch_optional(self.pool())
            .await
            .map_err(conn_err)?;
        row.as_ref().map(map_session_row).transpose()
    }

    async fn active_exam_sessions(&self) -> Result<Vec<Session>, StorageError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM exam_sessions
             WHERE status = 'active' AND mode = 'exam' AND expires_at IS NOT NULL
             ORDER BY started_at ASC"
        );
        let rows = sqlx::query(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(conn_err)?;
        rows.iter().map(map_session_row).collect()
    }

    async fn set_current_index(&self, id: SessionId, index: u32) -> Result<(), StorageError> {
        sqlx::query("UPDATE exam_sessions SET current_index = ?2 WHERE id = ?1")
            .bind(id.to_string())
            .bind(i64::from(index))
            .execute(self.pool())
            .await
            .map_err(conn_err)?;
        Ok(())
    }

    async fn question_at(
        &self,
        id: SessionId,
        index: u32,
    ) -> Result<SessionQuestionRow, StorageError> {
        let row = sqlx::query(
            "SELECT question_id, flagged FROM session_questions
             WHERE session_id = ?1 AND q_index = ?2",
        )
        .bind(id.to_string())
        .bind(i64::from(index))
        .fetch_optional(self.pool())
        .await
        .map_err(conn_err)?
        .ok_or(StorageError::NotFound)?;

        Ok(SessionQuestionRow {
            session_id: id,
            question_id: QuestionId::new(
                row.try_get("question_id")
                    .map_err(|e| StorageError::Serialization(e.to_string()))?,
            ),
            index,
            flagged: row
                .try_get("flagged")
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
        })
    }

    async fn question_rows(&self, id: SessionId) -> Result<Vec<SessionQuestionRow>, StorageError> {
        let rows = sqlx::query(
            "SELECT question_id, q_index, flagged FROM session_questions
             WHERE session_id = ?1 ORDER BY q_index ASC",
        )
        .bind(id.to_string())
        .fetch_all(self.pool())
        .await
        .map_err(conn_err)?;

        if rows.is_empty() {
            return Err(StorageError::NotFound);
        }
        rows.iter()
            .map(|row| {
                let q_index: i64 = row
                    .try_get("q_index")
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(SessionQuestionRow {
                    session_id: id,
                    question_id: QuestionId::new(
                        row.try_get("question_id")
                            .map_err(|e| StorageError::Serialization(e.to_string()))?,
                    ),
                    index: u32::try_from(q_index)
                        .map_err(|_| StorageError::Serialization("q_index out of range".into()))?,
                    flagged: row
                        .try_get("flagged")
                        .map_err(|e| StorageError::Serialization(e.to_string()))?,
                })
            })
            .collect()
    }

    async fn set_flag(&self, id: SessionId, index: u32, flagged: bool) -> Result<(), StorageError> {
        let res = sqlx::query(
            "UPDATE session_questions SET flagged = ?3 WHERE session_id = ?1 AND q_index = ?2",
        )
        .bind(id.to_string())
        .bind(i64::from(index))
        .bind(flagged)
        .execute(self.pool())
        .await
        .map_err(conn_err)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn clear_all_flags(&self, id: SessionId) -> Result<(), StorageError> {
        sqlx::query("UPDATE session_questions SET flagged = 0 WHERE session_id = ?1")
            .bind(id.to_string())
            .execute(self.pool())
            .await
            .map_err(conn_err)?;
        Ok(())
    }

    async fn replace_answer(
        &self,
        id: SessionId,
        question: QuestionId,
        answer: AnswerId,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool().begin().await.map_err(conn_err)?;

        sqlx::query("DELETE FROM session_answers WHERE session_id = ?1 AND question_id = ?2")
            .bind(id.to_string())
            .bind(question.value())
            .execute(&mut *tx)
            .await
            .map_err(conn_err)?;

        sqlx::query(
            "INSERT INTO session_answers (session_id, question_id, answer_id) VALUES (?1, ?2, ?3)",
        )
        .bind(id.to_string())
        .bind(question.value())
        .bind(answer.value())
        .execute(&mut *tx)
        .await
        .map_err(map_exec_err)?;

        tx.commit().await.map_err(conn_err)
    }

    async fn toggle_answer(
        &self,
        id: SessionId,
        question: QuestionId,
        answer: AnswerId,
    ) -> Result<bool, StorageError> {
        let mut tx = self.pool().begin().await.map_err(conn_err)?;

        let deleted = sqlx::query(
            "DELETE FROM session_answers
             WHERE session_id = ?1 AND question_id = ?2 AND answer_id = ?3",
        )
        .bind(id.to_string())
        .bind(question.value())
        .bind(answer.value())
        .execute(&mut *tx)
        .await
        .map_err(conn_err)?
        .rows_affected();

        let now_selected = if deleted == 0 {
            sqlx::query(
                "INSERT INTO session_answers (session_id, question_id, answer_id)
                 VALUES (?1, ?2, ?3)",
            )
            .bind(id.to_string())
            .bind(question.value())
            .bind(answer.value())
            .execute(&mut *tx)
            .await
            .map_err(map_exec_err)?;
            true
        } else {
            false
        };

        tx.commit().await.map_err(conn_err)?;
        Ok(now_selected)
    }

    async fn selected_answer_ids(
        &self,
        id: SessionId,
        question: QuestionId,
    ) -> Result<Vec<AnswerId>, StorageError> {
        let rows = sqlx::query(
            "SELECT answer_id FROM session_answers
             WHERE session_id = ?1 AND question_id = ?2
             ORDER BY answer_id ASC",
        )
        .bind(id.to_string())
        .bind(question.value())
        .fetch_all(self.pool())
        .await
        .map_err(conn_err)?;

        rows.iter()
            .map(|row| {
                row.try_get("answer_id")
                    .map(AnswerId::new)
                    .map_err(|e| StorageError::Serialization(e.to_string()))
            })
            .collect()
    }

    async fn clear_answers(
        &self,
        id: SessionId,
        question: Option<QuestionId>,
    ) -> Result<(), StorageError> {
        match question {
            Some(question) => {
                sqlx::query(
                    "DELETE FROM session_answers WHERE session_id = ?1 AND question_id = ?2",
                )
                .bind(id.to_string())
                .bind(question.value())
                .execute(self.pool())
                .await
                .map_err(conn_err)?;
            }
            None => {
                sqlx::query("DELETE FROM session_answers WHERE session_id = ?1")
                    .bind(id.to_string())
                    .execute(self.pool())
                    .await
                    .map_err(conn_err)?;
            }
        }
        Ok(())
    }

    async fn progress(&self, id: SessionId) -> Result<ProgressCounts, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                (SELECT COUNT(*) FROM session_questions sq
                   WHERE sq.session_id = s.id
                     AND EXISTS (SELECT 1 FROM session_answers sa
                                 WHERE sa.session_id = sq.session_id
                                   AND sa.question_id = sq.question_id)
                ) AS answered,
                (SELECT COUNT(*) FROM session_questions sq
                   WHERE sq.session_id = s.id AND sq.flagged = 1) AS flagged,
                s.total_count AS total
            FROM exam_sessions s
            WHERE s.id = ?1 LIMIT 1
            ",
        )
        .bind(id.to_string())
        .fetch_optional(self.pool())
        .await
        .map_err(conn_err)?
        .ok_or(StorageError::NotFound)?;

        let get = |column: &str| -> Result<u32, StorageError> {
            let raw: i64 = row
                .try_get(column)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            u32::try_from(raw)
                .map_err(|_| StorageError::Serialization(format!("{column} out of range")))
        };
        Ok(ProgressCounts {
            answered: get("answered")?,
            flagged: get("flagged")?,
            total: get("total")?,
        })
    }

    async fn answer_board(&self, id: SessionId) -> Result<Vec<QuestionState>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT sq.flagged,
                   EXISTS (SELECT 1 FROM session_answers sa
                           WHERE sa.session_id = sq.session_id
                             AND sa.question_id = sq.question_id) AS answered
            FROM session_questions sq
            WHERE sq.session_id = ?1
            ORDER BY sq.q_index ASC
            ",
        )
        .bind(id.to_string())
        .fetch_all(self.pool())
        .await
        .map_err(conn_err)?;

        if rows.is_empty() {
            return Err(StorageError::NotFound);
        }
        rows.iter()
            .map(|row| {
                let flagged: bool = row
                    .try_get("flagged")
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                let answered: bool = row
                    .try_get("answered")
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(if flagged {
                    QuestionState::Flagged
                } else if answered {
                    QuestionState::Answered
                } else {
                    QuestionState::Unanswered
                })
            })
            .collect()
    }

    async fn finalize_submission(
        &self,
        id: SessionId,
        finished_at: DateTime<Utc>,
        correct: u32,
        percent: u32,
        mark_user_failed: bool,
    ) -> Result<bool, StorageError> {
        let mut tx = self.pool().begin().await.map_err(conn_err)?;

        let won = sqlx::query(
            r"
            UPDATE exam_sessions
            SET status = 'submitted',
                finished_at = ?2,
                correct_count = ?3,
                score_percent = ?4
            WHERE id = ?1 AND status = 'active'
            ",
        )
        .bind(id.to_string())
        .bind(finished_at)
        .bind(i64::from(correct))
        .bind(i64::from(percent))
        .execute(&mut *tx)
        .await
        .map_err(conn_err)?
        .rows_affected()
            == 1;

        if won && mark_user_failed {
            sqlx::query(
                r"
                UPDATE users
                SET last_failed_at = ?2
                WHERE id = (SELECT user_id FROM exam_sessions WHERE id = ?1)
                ",
            )
            .bind(id.to_string())
            .bind(finished_at)
            .execute(&mut *tx)
            .await
            .map_err(conn_err)?;
        }

        tx.commit().await.map_err(conn_err)?;
        Ok(won)
    }

    async fn mark_expired(
        &self,
        id: SessionId,
        finished_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let res = sqlx::query(
            r"
            UPDATE exam_sessions
            SET status = 'expired', finished_at = ?2
            WHERE id = ?1 AND status = 'active'
            ",
        )
        .bind(id.to_string())
        .bind(finished_at)
        .execute(self.pool())
        .await
        .map_err(conn_err)?;
        Ok(res.rows_affected() == 1)
    }

    async fn set_warning_sent(
        &self,
        id: SessionId,
        kind: WarningKind,
    ) -> Result<(), StorageError> {
        let sql = format!(
            "UPDATE exam_sessions SET {} = 1 WHERE id = ?1",
            warn_column(kind)
        );
        sqlx::query(&sql)
            .bind(id.to_string())
            .execute(self.pool())
            .await
            .map_err(conn_err)?;
        Ok(())
    }
}
