use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the consolidated migration for the current schema.
///
/// Creates the pending skill queue, exam result history, and the single-row
/// active exam marker.
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
                CREATE TABLE IF NOT EXISTS pending_skills (
                    position INTEGER NOT NULL CHECK (position >= 0),
                    skill_id INTEGER NOT NULL PRIMARY KEY,
                    skill_name TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS exam_results (
                    id INTEGER PRIMARY KEY,
                    session_id BLOB NOT NULL UNIQUE,
                    skill_id INTEGER NOT NULL,
                    skill_name TEXT NOT NULL,
                    score REAL NOT NULL CHECK (score BETWEEN 0 AND 100),
                    level TEXT NOT NULL,
                    correct_answers INTEGER NOT NULL CHECK (correct_answers >= 0),
                    total_questions INTEGER NOT NULL CHECK (total_questions >= correct_answers),
                    written_reflection TEXT NOT NULL,
                    time_taken_secs INTEGER NOT NULL CHECK (time_taken_secs >= 0),
                    violation_count INTEGER NOT NULL CHECK (violation_count >= 0),
                    submission_trigger TEXT NOT NULL,
                    grade_source TEXT NOT NULL,
                    completed_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS active_exam (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    session_id BLOB NOT NULL,
                    skill_id INTEGER NOT NULL,
                    skill_name TEXT NOT NULL,
                    started_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_pending_skills_position
                    ON pending_skills (position);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_exam_results_skill_completed
                    ON exam_results (skill_id, completed_at);
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
