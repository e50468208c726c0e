use async_trait::async_trait;
use exam_core::model::{PendingSkill, PendingSkillQueue, SkillId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{ser, skill_id_from_i64, skill_id_to_i64};
use crate::repository::{PendingSkillRepository, StorageError};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl PendingSkillRepository for SqliteRepository {
    async fn load_queue(&self) -> Result<PendingSkillQueue, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT skill_id, skill_name
            FROM pending_skills
            ORDER BY position ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut skills = Vec::with_capacity(rows.len());
        for row in rows {
            let skill_id = skill_id_from_i64(row.try_get("skill_id").map_err(ser)?)?;
            let skill_name: String = row.try_get("skill_name").map_err(ser)?;
            skills.push(PendingSkill::new(skill_id, skill_name));
        }
        Ok(PendingSkillQueue::from_skills(skills))
    }

    async fn save_queue(&self, queue: &PendingSkillQueue) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query("DELETE FROM pending_skills")
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (position, skill) in queue.iter().enumerate() {
            let position = i64::try_from(position)
                .map_err(|_| StorageError::Serialization("queue position overflow".into()))?;
            sqlx::query(
                r"
                INSERT INTO pending_skills (position, skill_id, skill_name)
                VALUES (?1, ?2, ?3)
                ",
            )
            .bind(position)
            .bind(skill_id_to_i64(skill.skill_id)?)
            .bind(&skill.skill_name)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn remove_skill(&self, skill_id: SkillId) -> Result<bool, StorageError> {
        let res = sqlx::query("DELETE FROM pending_skills WHERE skill_id = ?1")
            .bind(skill_id_to_i64(skill_id)?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(res.rows_affected() > 0)
    }
}
