use async_trait::async_trait;
use exam_core::model::{ExamResult, SkillId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{map_result_row, ser, skill_id_to_i64};
use crate::repository::{ExamResultRepository, ExamResultRow, StorageError};

const RESULT_COLUMNS: &str = r"
    id, session_id, skill_id, skill_name, score, level, correct_answers,
    total_questions, written_reflection, time_taken_secs, violation_count,
    submission_trigger, grade_source, completed_at
";

fn map_result_row_with_id(row: &sqlx::sqlite::SqliteRow) -> Result<ExamResultRow, StorageError> {
    let id: i64 = row.try_get("id").map_err(ser)?;
    Ok(ExamResultRow::new(id, map_result_row(row)?))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

#[async_trait]
impl ExamResultRepository for SqliteRepository {
    async fn append_result(&self, result: &ExamResult) -> Result<i64, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO exam_results (
                session_id, skill_id, skill_name, score, level, correct_answers,
                total_questions, written_reflection, time_taken_secs, violation_count,
                submission_trigger, grade_source, completed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ",
        )
        .bind(result.session_id().value())
        .bind(skill_id_to_i64(result.skill_id())?)
        .bind(result.skill_name())
        .bind(result.score())
        .bind(result.level().as_str())
        .bind(i64::from(result.correct_answers()))
        .bind(i64::from(result.total_questions()))
        .bind(result.written_reflection())
        .bind(i64::from(result.time_taken_secs()))
        .bind(i64::from(result.violation_count()))
        .bind(result.trigger().as_str())
        .bind(result.source().as_str())
        .bind(result.completed_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::Conflict
            } else {
                StorageError::Connection(e.to_string())
            }
        })?;

        Ok(res.last_insert_rowid())
    }

    async fn get_result(&self, id: i64) -> Result<ExamResult, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {RESULT_COLUMNS} FROM exam_results WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .ok_or(StorageError::NotFound)?;

        map_result_row(&row)
    }

    async fn list_results(
        &self,
        skill_id: Option<SkillId>,
        limit: u32,
    ) -> Result<Vec<ExamResultRow>, StorageError> {
        let skill_id = skill_id.map(skill_id_to_i64).transpose()?;
        let rows = sqlx::query(&format!(
            r"
            SELECT {RESULT_COLUMNS}
            FROM exam_results
            WHERE (?1 IS NULL OR skill_id = ?1)
            ORDER BY completed_at DESC, id DESC
            LIMIT ?2
            "
        ))
        .bind(skill_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter().map(map_result_row_with_id).collect()
    }
}
