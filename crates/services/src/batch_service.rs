use std::sync::Arc;

use exam_core::Clock;
use exam_core::model::{ExamSession, PendingSkill, PendingSkillQueue, SessionId, SkillId};
use storage::repository::{
    ActiveExamMarker, ActiveExamRepository, ExamResultRepository, ExamResultRow,
    PendingSkillRepository,
};
use tracing::info;

use crate::error::{BatchError, ExamLoadError};
use crate::exam::source::QuestionSource;

/// The batch of skills a user is being assessed on, and the exams started from it.
#[derive(Clone)]
pub struct AssessmentBatchService {
    clock: Clock,
    questions: Arc<dyn QuestionSource>,
    pending: Arc<dyn PendingSkillRepository>,
    results: Arc<dyn ExamResultRepository>,
    active: Arc<dyn ActiveExamRepository>,
}

impl AssessmentBatchService {
    #[must_use]
    pub fn new(
        clock: Clock,
        questions: Arc<dyn QuestionSource>,
        pending: Arc<dyn PendingSkillRepository>,
        results: Arc<dyn ExamResultRepository>,
        active: Arc<dyn ActiveExamRepository>,
    ) -> Self {
        Self {
            clock,
            questions,
            pending,
            results,
            active,
        }
    }

    /// Append skills to the persisted queue, skipping ones already queued.
    ///
    /// Returns how many were added.
    ///
    /// # Errors
    ///
    /// Returns `BatchError` if the queue cannot be read or written.
    pub async fn enqueue(
        &self,
        skills: impl IntoIterator<Item = PendingSkill> + Send,
    ) -> Result<usize, BatchError> {
        let mut queue = self.pending.load_queue().await?;
        let added = skills.into_iter().filter(|skill| queue.push(skill.clone())).count();
        if added > 0 {
            self.pending.save_queue(&queue).await?;
        }
        Ok(added)
    }

    /// # Errors
    ///
    /// Returns `BatchError` if the queue cannot be read.
    pub async fn pending(&self) -> Result<PendingSkillQueue, BatchError> {
        Ok(self.pending.load_queue().await?)
    }

    /// Resolve a deep-linked skill id against the queue.
    ///
    /// # Errors
    ///
    /// Returns `ExamLoadError::MissingSkill` without an id and `UnknownSkill`
    /// when the id is not pending.
    pub async fn resolve_skill(&self, skill_id: Option<SkillId>) -> Result<PendingSkill, ExamLoadError> {
        let skill_id = skill_id.ok_or(ExamLoadError::MissingSkill)?;
        let queue = self.pending.load_queue().await?;
        queue
            .get(skill_id)
            .cloned()
            .ok_or(ExamLoadError::UnknownSkill(skill_id))
    }

    /// Load the question set and create a fresh session in `Loading`.
    ///
    /// # Errors
    ///
    /// Returns `ExamLoadError` if questions cannot be loaded or the active
    /// marker cannot be written. No session is created in that case.
    pub async fn start_exam(&self, skill: PendingSkill) -> Result<ExamSession, ExamLoadError> {
        let set = self.questions.load_questions(skill.skill_id).await?;
        let session = ExamSession::new(skill, set, self.clock.now());

        self.active
            .set_active(&ActiveExamMarker {
                session_id: session.id(),
                skill_id: session.skill_id(),
                skill_name: session.skill_name().to_owned(),
                started_at: session.started_at(),
            })
            .await?;

        info!(
            session_id = %session.id(),
            skill_id = %session.skill_id(),
            questions = session.questions().len(),
            time_limit_secs = session.time_limit_secs(),
            "exam prepared"
        );
        Ok(session)
    }

    /// Start the exam for the head of the queue, if any.
    ///
    /// # Errors
    ///
    /// See [`AssessmentBatchService::start_exam`].
    pub async fn start_next(&self) -> Result<Option<ExamSession>, ExamLoadError> {
        let queue = self.pending.load_queue().await?;
        match queue.front().cloned() {
            Some(skill) => Ok(Some(self.start_exam(skill).await?)),
            None => Ok(None),
        }
    }

    /// The marker left by an exam that never completed.
    ///
    /// # Errors
    ///
    /// Returns `BatchError` if the marker cannot be read.
    pub async fn interrupted(&self) -> Result<Option<ActiveExamMarker>, BatchError> {
        Ok(self.active.get_active().await?)
    }

    /// Forget an interrupted exam. Its skill stays queued.
    ///
    /// # Errors
    ///
    /// Returns `BatchError` if the marker cannot be cleared.
    pub async fn discard_interrupted(&self, session_id: SessionId) -> Result<(), BatchError> {
        Ok(self.active.clear_active(session_id).await?)
    }

    /// Most recent results first.
    ///
    /// # Errors
    ///
    /// Returns `BatchError` if results cannot be read.
    pub async fn history(
        &self,
        skill_id: Option<SkillId>,
        limit: u32,
    ) -> Result<Vec<ExamResultRow>, BatchError> {
        Ok(self.results.list_results(skill_id, limit).await?)
    }
}
