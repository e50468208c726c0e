use exam_core::model::{
    ExamResult, ExamResultDraft, GradeSource, SessionId, SkillId, SubmissionTrigger,
};
use sqlx::Row;
use uuid::Uuid;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn skill_id_from_i64(v: i64) -> Result<SkillId, StorageError> {
    u64::try_from(v)
        .map(SkillId::new)
        .map_err(|_| StorageError::Serialization("skill_id sign overflow".into()))
}

pub(crate) fn skill_id_to_i64(id: SkillId) -> Result<i64, StorageError> {
    i64::try_from(id.value())
        .map_err(|_| StorageError::Serialization("skill_id overflow".into()))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn session_id_from_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<SessionId, StorageError> {
    let raw: Uuid = row.try_get("session_id").map_err(ser)?;
    Ok(SessionId::from_uuid(raw))
}

pub(crate) fn map_result_row(row: &sqlx::sqlite::SqliteRow) -> Result<ExamResult, StorageError> {
    let trigger: String = row.try_get("submission_trigger").map_err(ser)?;
    let source: String = row.try_get("grade_source").map_err(ser)?;

    // `level` is stored for reporting queries only; it is re-derived from the score.
    ExamResultDraft {
        session_id: session_id_from_row(row)?,
        skill_id: skill_id_from_i64(row.try_get("skill_id").map_err(ser)?)?,
        skill_name: row.try_get("skill_name").map_err(ser)?,
        score: row.try_get("score").map_err(ser)?,
        correct_answers: u32_from_i64(
            "correct_answers",
            row.try_get("correct_answers").map_err(ser)?,
        )?,
        total_questions: u32_from_i64(
            "total_questions",
            row.try_get("total_questions").map_err(ser)?,
        )?,
        written_reflection: row.try_get("written_reflection").map_err(ser)?,
        time_taken_secs: u32_from_i64(
            "time_taken_secs",
            row.try_get("time_taken_secs").map_err(ser)?,
        )?,
        violation_count: u32_from_i64(
            "violation_count",
            row.try_get("violation_count").map_err(ser)?,
        )?,
        trigger: trigger.parse::<SubmissionTrigger>().map_err(ser)?,
        source: source.parse::<GradeSource>().map_err(ser)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
    }
    .validate()
    .map_err(ser)
}
