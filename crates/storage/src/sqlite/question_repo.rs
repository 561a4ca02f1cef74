use sqlx::Row;

use exam_core::model::{AnswerId, AnswerOption, Question, QuestionId, Section};

use super::SqliteRepository;
use super::mapping::{conn_err, map_answer_row, map_exec_err, map_question_row};
use crate::repository::{QuestionRepository, StorageError};

#[async_trait::async_trait]
impl QuestionRepository for SqliteRepository {
    async fn question(&self, id: QuestionId) -> Result<Question, StorageError> {
        let row = sqlx::query(
            "SELECT id, section, qtype, text, code_snippet, explanation, is_active
             FROM questions WHERE id = ?1 LIMIT 1",
        )
        .bind(id.value())
        .fetch_optional(self.pool())
        .await
        .map_err(conn_err)?
        .ok_or(StorageError::NotFound)?;
        map_question_row(&row)
    }

    async fn answers_for_question(
        &self,
        id: QuestionId,
    ) -> Result<Vec<AnswerOption>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, question_id, text, is_correct, order_index
             FROM answers WHERE question_id = ?1
             ORDER BY order_index ASC, id ASC",
        )
        .bind(id.value())
        .fetch_all(self.pool())
        .await
        .map_err(conn_err)?;
        rows.iter().map(map_answer_row).collect()
    }

    async fn correct_answer_ids(&self, id: QuestionId) -> Result<Vec<AnswerId>, StorageError> {
        let rows = sqlx::query(
            "SELECT id FROM answers
             WHERE question_id = ?1 AND is_correct = 1
             ORDER BY id ASC",
        )
        .bind(id.value())
        .fetch_all(self.pool())
        .await
        .map_err(conn_err)?;

        rows.iter()
            .map(|row| {
                row.try_get("id")
                    .map(AnswerId::new)
                    .map_err(|e| StorageError::Serialization(e.to_string()))
            })
            .collect()
    }

    async fn active_ids_by_section(
        &self,
        section: Section,
    ) -> Result<Vec<QuestionId>, StorageError> {
        let rows = sqlx::query(
            "SELECT id FROM questions
             WHERE section = ?1 AND is_active = 1
             ORDER BY id ASC",
        )
        .bind(section.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(conn_err)?;

        rows.iter()
            .map(|row| {
                row.try_get("id")
                    .map(QuestionId::new)
                    .map_err(|e| StorageError::Serialization(e.to_string()))
            })
            .collect()
    }

    async fn count_active_by_section(&self, section: Section) -> Result<u32, StorageError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM questions WHERE section = ?1 AND is_active = 1",
        )
        .bind(section.as_str())
        .fetch_one(self.pool())
        .await
        .map_err(conn_err)?;
        let n: i64 = row
            .try_get("n")
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        u32::try_from(n).map_err(|_| StorageError::Serialization("count out of range".into()))
    }

    async fn insert_question(
        &self,
        question: &Question,
        options: &[AnswerOption],
    ) -> Result<(), StorageError> {
        let mut tx = self.pool().begin().await.map_err(conn_err)?;

        sqlx::query(
            r"
            INSERT INTO questions (id, section, qtype, text, code_snippet, explanation, is_active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )
        .bind(question.id.value())
        .bind(question.section.as_str())
        .bind(question.qtype.as_str())
        .bind(question.text.as_str())
        .bind(question.code_snippet.as_deref())
        .bind(question.explanation.as_deref())
        .bind(question.is_active)
        .execute(&mut *tx)
        .await
        .map_err(map_exec_err)?;

        for option in options {
            sqlx::query(
                r"
                INSERT INTO answers (id, question_id, text, is_correct, order_index)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )
            .bind(option.id.value())
            .bind(option.question_id.value())
            .bind(option.text.as_str())
            .bind(option.is_correct)
            .bind(i64::from(option.order_index))
            .execute(&mut *tx)
            .await
            .map_err(map_exec_err)?;
        }

        tx.commit().await.map_err(conn_err)
    }
}
