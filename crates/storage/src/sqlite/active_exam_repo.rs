use async_trait::async_trait;
use exam_core::model::SessionId;
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{ser, session_id_from_row, skill_id_from_i64, skill_id_to_i64};
use crate::repository::{ActiveExamMarker, ActiveExamRepository, StorageError};

#[async_trait]
impl ActiveExamRepository for SqliteRepository {
    async fn set_active(&self, marker: &ActiveExamMarker) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO active_exam (id, session_id, skill_id, skill_name, started_at)
            VALUES (1, ?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                session_id = excluded.session_id,
                skill_id = excluded.skill_id,
                skill_name = excluded.skill_name,
                started_at = excluded.started_at
            ",
        )
        .bind(marker.session_id.value())
        .bind(skill_id_to_i64(marker.skill_id)?)
        .bind(&marker.skill_name)
        .bind(marker.started_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn get_active(&self) -> Result<Option<ActiveExamMarker>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT session_id, skill_id, skill_name, started_at
            FROM active_exam
            WHERE id = 1
            ",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(ActiveExamMarker {
            session_id: session_id_from_row(&row)?,
            skill_id: skill_id_from_i64(row.try_get("skill_id").map_err(ser)?)?,
            skill_name: row.try_get("skill_name").map_err(ser)?,
            started_at: row.try_get("started_at").map_err(ser)?,
        }))
    }

    async fn clear_active(&self, session_id: SessionId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM active_exam WHERE id = 1 AND session_id = ?1")
            .bind(session_id.value())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }
}
