use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exam_core::model::{ExamResult, PendingSkill, PendingSkillQueue, SessionId, SkillId};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persisted marker for the exam currently in progress.
///
/// Written when a session starts and cleared when it completes. A marker that
/// is still present on the next launch identifies an interrupted exam.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveExamMarker {
    pub session_id: SessionId,
    pub skill_id: SkillId,
    pub skill_name: String,
    pub started_at: DateTime<Utc>,
}

/// A stored result together with its storage row id.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamResultRow {
    pub id: i64,
    pub result: ExamResult,
}

impl ExamResultRow {
    #[must_use]
    pub fn new(id: i64, result: ExamResult) -> Self {
        Self { id, result }
    }
}

/// Persistence for the batch of skills still to be examined.
#[async_trait]
pub trait PendingSkillRepository: Send + Sync {
    /// Load the queue in order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the queue cannot be read.
    async fn load_queue(&self) -> Result<PendingSkillQueue, StorageError>;

    /// Replace the stored queue with `queue`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the queue cannot be written.
    async fn save_queue(&self, queue: &PendingSkillQueue) -> Result<(), StorageError>;

    /// Remove one skill, leaving the order of the others untouched.
    ///
    /// Returns `true` if an entry was removed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn remove_skill(&self, skill_id: SkillId) -> Result<bool, StorageError>;
}

/// Append-only history of finished exams.
#[async_trait]
pub trait ExamResultRepository: Send + Sync {
    /// Store a result, returning its row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a result for the same session exists.
    async fn append_result(&self, result: &ExamResult) -> Result<i64, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_result(&self, id: i64) -> Result<ExamResult, StorageError>;

    /// Most recent results first, optionally for a single skill.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn list_results(
        &self,
        skill_id: Option<SkillId>,
        limit: u32,
    ) -> Result<Vec<ExamResultRow>, StorageError>;
}

/// Single-slot store for the in-progress exam marker.
#[async_trait]
pub trait ActiveExamRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the marker cannot be written.
    async fn set_active(&self, marker: &ActiveExamMarker) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the marker cannot be read.
    async fn get_active(&self) -> Result<Option<ActiveExamMarker>, StorageError>;

    /// Clear the marker, but only if it still belongs to `session_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the marker cannot be cleared.
    async fn clear_active(&self, session_id: SessionId) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    queue: Arc<Mutex<PendingSkillQueue>>,
    results: Arc<Mutex<Vec<ExamResultRow>>>,
    active: Arc<Mutex<Option<ActiveExamMarker>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the queue with the given skills.
    #[must_use]
    pub fn with_pending(self, skills: impl IntoIterator<Item = PendingSkill>) -> Self {
        if let Ok(mut guard) = self.queue.lock() {
            *guard = PendingSkillQueue::from_skills(skills);
        }
        self
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl PendingSkillRepository for InMemoryRepository {
    async fn load_queue(&self) -> Result<PendingSkillQueue, StorageError> {
        let guard = self.queue.lock().map_err(poisoned)?;
        Ok(guard.clone())
    }

    async fn save_queue(&self, queue: &PendingSkillQueue) -> Result<(), StorageError> {
        let mut guard = self.queue.lock().map_err(poisoned)?;
        *guard = queue.clone();
        Ok(())
    }

    async fn remove_skill(&self, skill_id: SkillId) -> Result<bool, StorageError> {
        let mut guard = self.queue.lock().map_err(poisoned)?;
        Ok(guard.remove(skill_id).is_some())
    }
}

#[async_trait]
impl ExamResultRepository for InMemoryRepository {
    async fn append_result(&self, result: &ExamResult) -> Result<i64, StorageError> {
        let mut guard = self.results.lock().map_err(poisoned)?;
        if guard
            .iter()
            .any(|row| row.result.session_id() == result.session_id())
        {
            return Err(StorageError::Conflict);
        }
        let id = i64::try_from(guard.len())
            .map_err(|_| StorageError::Serialization("result id overflow".into()))?
            + 1;
        guard.push(ExamResultRow::new(id, result.clone()));
        Ok(id)
    }

    async fn get_result(&self, id: i64) -> Result<ExamResult, StorageError> {
        let guard = self.results.lock().map_err(poisoned)?;
        guard
            .iter()
            .find(|row| row.id == id)
            .map(|row| row.result.clone())
            .ok_or(StorageError::NotFound)
    }

    async fn list_results(
        &self,
        skill_id: Option<SkillId>,
        limit: u32,
    ) -> Result<Vec<ExamResultRow>, StorageError> {
        let guard = self.results.lock().map_err(poisoned)?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let mut rows: Vec<_> = guard
            .iter()
            .filter(|row| skill_id.is_none_or(|id| row.result.skill_id() == id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.result
                .completed_at()
                .cmp(&a.result.completed_at())
                .then(b.id.cmp(&a.id))
        });
        rows.truncate(limit);
        Ok(rows)
    }
}

#[async_trait]
impl ActiveExamRepository for InMemoryRepository {
    async fn set_active(&self, marker: &ActiveExamMarker) -> Result<(), StorageError> {
        let mut guard = self.active.lock().map_err(poisoned)?;
        *guard = Some(marker.clone());
        Ok(())
    }

    async fn get_active(&self) -> Result<Option<ActiveExamMarker>, StorageError> {
        let guard = self.active.lock().map_err(poisoned)?;
        Ok(guard.clone())
    }

    async fn clear_active(&self, session_id: SessionId) -> Result<(), StorageError> {
        let mut guard = self.active.lock().map_err(poisoned)?;
        if guard.as_ref().is_some_and(|m| m.session_id == session_id) {
            *guard = None;
        }
        Ok(())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub pending: Arc<dyn PendingSkillRepository>,
    pub results: Arc<dyn ExamResultRepository>,
    pub active: Arc<dyn ActiveExamRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    #[must_use]
    pub fn from_repository(repo: InMemoryRepository) -> Self {
        let pending: Arc<dyn PendingSkillRepository> = Arc::new(repo.clone());
        let results: Arc<dyn ExamResultRepository> = Arc::new(repo.clone());
        let active: Arc<dyn ActiveExamRepository> = Arc::new(repo);
        Self {
            pending,
            results,
            active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{ExamResultDraft, GradeSource, SubmissionTrigger};
    use exam_core::time::fixed_now;

    fn build_result(skill: u64, score: f64, offset_secs: i64) -> ExamResult {
        ExamResultDraft {
            session_id: SessionId::generate(),
            skill_id: SkillId::new(skill),
            skill_name: format!("Skill {skill}"),
            score,
            correct_answers: 1,
            total_questions: 2,
            written_reflection: String::new(),
            time_taken_secs: 12,
            violation_count: 0,
            trigger: SubmissionTrigger::Manual,
            source: GradeSource::Fallback,
            completed_at: fixed_now() + chrono::Duration::seconds(offset_secs),
        }
        .validate()
        .unwrap()
    }

    #[tokio::test]
    async fn queue_removal_keeps_order() {
        let repo = InMemoryRepository::new().with_pending([
            PendingSkill::new(SkillId::new(1), "SQL"),
            PendingSkill::new(SkillId::new(2), "Rust"),
            PendingSkill::new(SkillId::new(3), "Go"),
        ]);

        assert!(repo.remove_skill(SkillId::new(2)).await.unwrap());
        assert!(!repo.remove_skill(SkillId::new(2)).await.unwrap());

        let queue = repo.load_queue().await.unwrap();
        let ids: Vec<_> = queue.iter().map(|s| s.skill_id.value()).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn results_list_newest_first_and_filter() {
        let repo = InMemoryRepository::new();
        repo.append_result(&build_result(1, 50.0, 0)).await.unwrap();
        repo.append_result(&build_result(2, 70.0, 10)).await.unwrap();
        repo.append_result(&build_result(1, 90.0, 20)).await.unwrap();

        let all = repo.list_results(None, 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!((all[0].result.score() - 90.0).abs() < f64::EPSILON);

        let sql = repo.list_results(Some(SkillId::new(1)), 1).await.unwrap();
        assert_eq!(sql.len(), 1);
        assert_eq!(sql[0].result.skill_id(), SkillId::new(1));
    }

    #[tokio::test]
    async fn duplicate_session_result_conflicts() {
        let repo = InMemoryRepository::new();
        let result = build_result(1, 50.0, 0);
        repo.append_result(&result).await.unwrap();
        assert!(matches!(
            repo.append_result(&result).await,
            Err(StorageError::Conflict)
        ));
    }

    #[tokio::test]
    async fn clearing_marker_checks_session() {
        let repo = InMemoryRepository::new();
        let marker = ActiveExamMarker {
            session_id: SessionId::generate(),
            skill_id: SkillId::new(1),
            skill_name: "SQL".into(),
            started_at: fixed_now(),
        };
        repo.set_active(&marker).await.unwrap();

        repo.clear_active(SessionId::generate()).await.unwrap();
        assert_eq!(repo.get_active().await.unwrap(), Some(marker.clone()));

        repo.clear_active(marker.session_id).await.unwrap();
        assert_eq!(repo.get_active().await.unwrap(), None);
    }
}
