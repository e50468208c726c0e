use std::sync::Arc;

use async_trait::async_trait;
use exam_core::model::{ExamSession, QuestionSet, SkillId};
use exam_core::policy::ProctoringPolicy;
use storage::repository::Storage;
use tracing::info;

use crate::Clock;
use crate::api::HttpExamApi;
use crate::batch_service::AssessmentBatchService;
use crate::config::{ExamApiConfig, policy_from_env};
use crate::error::{AppServicesError, ExamLoadError};
use crate::exam::{
    ActiveExamFlag, CompletionNotifier, EventHost, ExamEngine, ExamHandle, ExamRunner,
    GradingPipeline, PresentationHost, QuestionSource, SubmissionCoordinator,
};

/// Question source used when no exam API is configured.
struct UnconfiguredQuestions;

#[async_trait]
impl QuestionSource for UnconfiguredQuestions {
    async fn load_questions(&self, _skill_id: SkillId) -> Result<QuestionSet, ExamLoadError> {
        Err(ExamLoadError::Disabled)
    }
}

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    policy: ProctoringPolicy,
    batch: Arc<AssessmentBatchService>,
    coordinator: SubmissionCoordinator,
    active_flag: ActiveExamFlag,
}

impl AppServices {
    /// Build services backed by `SQLite`, reading API and policy settings from
    /// the environment. `questions` overrides the API as the question source.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails or the
    /// environment holds invalid settings.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        questions: Option<Arc<dyn QuestionSource>>,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        let policy = policy_from_env()?;
        let api = ExamApiConfig::from_env()?.map(|config| Arc::new(HttpExamApi::new(config)));

        let pipeline = match &api {
            Some(api) => GradingPipeline::new(api.clone(), api.config().grading_timeout),
            None => GradingPipeline::local_only(),
        };
        let questions: Arc<dyn QuestionSource> = match (questions, api) {
            (Some(questions), _) => questions,
            (None, Some(api)) => api,
            (None, None) => Arc::new(UnconfiguredQuestions),
        };
        info!(
            remote_grading = pipeline.is_remote(),
            violation_ceiling = policy.violation_ceiling(),
            "exam services ready"
        );

        Ok(Self::from_storage(&storage, clock, policy, questions, pipeline))
    }

    #[must_use]
    pub fn from_storage(
        storage: &Storage,
        clock: Clock,
        policy: ProctoringPolicy,
        questions: Arc<dyn QuestionSource>,
        pipeline: GradingPipeline,
    ) -> Self {
        let batch = Arc::new(AssessmentBatchService::new(
            clock,
            questions,
            Arc::clone(&storage.pending),
            Arc::clone(&storage.results),
            Arc::clone(&storage.active),
        ));
        let coordinator = SubmissionCoordinator::new(
            clock,
            pipeline,
            CompletionNotifier::default(),
            Arc::clone(&storage.results),
            Arc::clone(&storage.pending),
            Arc::clone(&storage.active),
        );

        Self {
            policy,
            batch,
            coordinator,
            active_flag: ActiveExamFlag::new(),
        }
    }

    #[must_use]
    pub fn policy(&self) -> ProctoringPolicy {
        self.policy
    }

    #[must_use]
    pub fn batch(&self) -> Arc<AssessmentBatchService> {
        Arc::clone(&self.batch)
    }

    #[must_use]
    pub fn coordinator(&self) -> &SubmissionCoordinator {
        &self.coordinator
    }

    #[must_use]
    pub fn notifier(&self) -> &CompletionNotifier {
        self.coordinator.notifier()
    }

    /// Shared by every exam run from these services.
    #[must_use]
    pub fn active_flag(&self) -> ActiveExamFlag {
        self.active_flag.clone()
    }

    /// Wire a prepared session to the given hosts.
    #[must_use]
    pub fn runner(
        &self,
        session: ExamSession,
        events: Arc<dyn EventHost>,
        presentation: Arc<dyn PresentationHost>,
    ) -> (ExamRunner, ExamHandle) {
        let engine = ExamEngine::new(session, self.policy, presentation);
        ExamRunner::new(
            engine,
            self.coordinator.clone(),
            events,
            self.active_flag.clone(),
        )
    }
}
