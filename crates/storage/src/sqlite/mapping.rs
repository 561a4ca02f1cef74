use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use exam_core::model::{
    AnswerId, AnswerOption, ExamId, Question, QuestionId, Session, SessionId, UserId,
};

use crate::repository::StorageError;

/// Maps a query/execute failure, surfacing unique-constraint violations as
/// `Conflict`.
pub(super) fn map_exec_err(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.kind() == sqlx::error::ErrorKind::UniqueViolation => {
            StorageError::Conflict
        }
        _ => StorageError::Connection(e.to_string()),
    }
}

pub(super) fn conn_err(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn ser<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn index_u32(raw: i64, column: &str) -> Result<u32, StorageError> {
    u32::try_from(raw).map_err(|_| StorageError::Serialization(format!("{column} out of range")))
}

pub(super) fn map_session_row(row: &SqliteRow) -> Result<Session, StorageError> {
    let id: String = row.try_get("id").map_err(ser)?;
    let id: SessionId = id.parse().map_err(ser)?;
    let mode: String = row.try_get("mode").map_err(ser)?;
    let status: String = row.try_get("status").map_err(ser)?;
    let started_at: DateTime<Utc> = row.try_get("started_at").map_err(ser)?;
    let expires_at: Option<DateTime<Utc>> = row.try_get("expires_at").map_err(ser)?;
    let finished_at: Option<DateTime<Utc>> = row.try_get("finished_at").map_err(ser)?;
    let current_index = index_u32(row.try_get("current_index").map_err(ser)?, "current_index")?;
    let total_count = index_u32(row.try_get("total_count").map_err(ser)?, "total_count")?;
    let correct_count: Option<i64> = row.try_get("correct_count").map_err(ser)?;
    let score_percent: Option<i64> = row.try_get("score_percent").map_err(ser)?;

    Session::from_persisted(
        id,
        UserId::new(row.try_get("user_id").map_err(ser)?),
        ExamId::new(row.try_get("exam_id").map_err(ser)?),
        mode.parse().map_err(ser)?,
        status.parse().map_err(ser)?,
        started_at,
        expires_at,
        finished_at,
        current_index,
        total_count,
        (
            row.try_get::<bool, _>("warn10_sent").map_err(ser)?,
            row.try_get::<bool, _>("warn5_sent").map_err(ser)?,
            row.try_get::<bool, _>("warn1_sent").map_err(ser)?,
        ),
        correct_count
            .map(|n| index_u32(n, "correct_count"))
            .transpose()?,
        score_percent
            .map(|n| index_u32(n, "score_percent"))
            .transpose()?,
    )
    .map_err(ser)
}

pub(super) fn map_question_row(row: &SqliteRow) -> Result<Question, StorageError> {
    let section: String = row.try_get("section").map_err(ser)?;
    let qtype: String = row.try_get("qtype").map_err(ser)?;
    Ok(Question {
        id: QuestionId::new(row.try_get("id").map_err(ser)?),
        section: section.parse().map_err(ser)?,
        qtype: qtype.parse().map_err(ser)?,
        text: row.try_get("text").map_err(ser)?,
        code_snippet: row.try_get("code_snippet").map_err(ser)?,
        explanation: row.try_get("explanation").map_err(ser)?,
        is_active: row.try_get("is_active").map_err(ser)?,
    })
}

pub(super) fn map_answer_row(row: &SqliteRow) -> Result<AnswerOption, StorageError> {
    Ok(AnswerOption {
        id: AnswerId::new(row.try_get("id").map_err(ser)?),
        question_id: QuestionId::new(row.try_get("question_id").map_err(ser)?),
        text: row.try_get("text").map_err(ser)?,
        is_correct: row.try_get("is_correct").map_err(ser)?,
        order_index: index_u32(row.try_get("order_index").map_err(ser)?, "order_index")?,
    })
}
