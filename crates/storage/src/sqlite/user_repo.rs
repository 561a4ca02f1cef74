use chrono::{DateTime, Utc};
use sqlx::Row;

use exam_core::model::UserId;

use super::SqliteRepository;
use super::mapping::conn_err;
use crate::repository::{StorageError, UserRepository};

#[async_trait::async_trait]
impl UserRepository for SqliteRepository {
    async fn ensure_user(&self, id: UserId) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO users (id) VALUES (?1) ON CONFLICT(id) DO NOTHING")
            .bind(id.value())
            .execute(self.pool())
            .await
            .map_err(conn_err)?;
        Ok(())
    }

    async fn record_failure(&self, id: UserId, at: DateTime<Utc>) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO users (id, last_failed_at)
            VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET last_failed_at = excluded.last_failed_at
            ",
        )
        .bind(id.value())
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(conn_err)?;
        Ok(())
    }

    async fn last_failure(&self, id: UserId) -> Result<Option<DateTime<Utc>>, StorageError> {
        let row = sqlx::query("SELECT last_failed_at FROM users WHERE id = ?1 LIMIT 1")
            .bind(id.value())
            .fetch_optional(self.pool())
            .await
            .map_err(conn_err)?;

        row.map(|row| {
            row.try_get::<Option<DateTime<Utc>>, _>("last_failed_at")
                .map_err(|e| StorageError::Serialization(e.to_string()))
        })
        .transpose()
        .map(Option::flatten)
    }
}
