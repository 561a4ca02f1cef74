use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the full schema: users, the question bank, sessions with their
/// question bindings and chosen answers, and the supporting indexes.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY,
                    last_failed_at TEXT
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS questions (
                    id INTEGER PRIMARY KEY,
                    section TEXT NOT NULL CHECK (section IN ('objects', 'classes', 'builtins', 'advfunc')),
                    qtype TEXT NOT NULL CHECK (qtype IN ('single', 'multi')),
                    text TEXT NOT NULL,
                    code_snippet TEXT,
                    explanation TEXT,
                    is_active INTEGER NOT NULL DEFAULT 1
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS answers (
                    id INTEGER PRIMARY KEY,
                    question_id INTEGER NOT NULL,
                    text TEXT NOT NULL,
                    is_correct INTEGER NOT NULL DEFAULT 0,
                    order_index INTEGER NOT NULL,
                    FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS exam_sessions (
                    id TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL,
                    exam_id INTEGER NOT NULL,
                    mode TEXT NOT NULL CHECK (mode IN ('exam', 'practice')),
                    status TEXT NOT NULL CHECK (status IN ('active', 'submitted', 'expired')),
                    started_at TEXT NOT NULL,
                    expires_at TEXT,
                    finished_at TEXT,
                    current_index INTEGER NOT NULL CHECK (current_index >= 1),
                    total_count INTEGER NOT NULL CHECK (total_count > 0),
                    warn10_sent INTEGER NOT NULL DEFAULT 0,
                    warn5_sent INTEGER NOT NULL DEFAULT 0,
                    warn1_sent INTEGER NOT NULL DEFAULT 0,
                    correct_count INTEGER,
                    score_percent INTEGER,
                    FOREIGN KEY (user_id) REFERENCES users(id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS session_questions (
                    session_id TEXT NOT NULL,
                    question_id INTEGER NOT NULL,
                    q_index INTEGER NOT NULL CHECK (q_index >= 1),
                    flagged INTEGER NOT NULL DEFAULT 0,
                    PRIMARY KEY (session_id, q_index),
                    UNIQUE (session_id, question_id),
                    FOREIGN KEY (session_id) REFERENCES exam_sessions(id) ON DELETE CASCADE,
                    FOREIGN KEY (question_id) REFERENCES questions(id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS session_answers (
                    session_id TEXT NOT NULL,
                    question_id INTEGER NOT NULL,
                    answer_id INTEGER NOT NULL,
                    PRIMARY KEY (session_id, question_id, answer_id),
                    FOREIGN KEY (session_id) REFERENCES exam_sessions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_sessions_user_status
                    ON exam_sessions (user_id, status);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_sessions_status_mode
                    ON exam_sessions (status, mode);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_answers_question_order
                    ON answers (question_id, order_index);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_questions_section_active
                    ON questions (section, is_active);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
