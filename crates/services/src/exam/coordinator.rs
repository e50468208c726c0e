use std::sync::Arc;

use exam_core::Clock;
use exam_core::model::{
    ExamPhase, ExamResult, ExamResultDraft, ExamSession, PendingSkill, ResultError, SessionError,
    SessionId, SubmissionTrigger,
};
use exam_core::scoring::{LocalGrade, grade_locally};
use storage::repository::{ActiveExamRepository, ExamResultRepository, PendingSkillRepository};
use tracing::{info, warn};

use super::grading::{GradingOutcome, GradingPipeline, GradingRequest};
use super::notify::{AssessmentCompleted, CompletionNotifier};
use crate::error::SubmitError;

/// Snapshot taken when grading starts. Grading needs nothing else from the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionTicket {
    pub session_id: SessionId,
    pub trigger: SubmissionTrigger,
    pub request: GradingRequest,
    pub local: LocalGrade,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BeginOutcome {
    Started(SubmissionTicket),
    /// Another trigger already started grading.
    InProgress,
    AlreadyComplete(ExamResult),
}

/// Where to go once the result is shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    NextExam(PendingSkill),
    ReturnToResults,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub result: ExamResult,
    pub next: NextStep,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Completed(Completion),
    InProgress,
    AlreadyComplete(ExamResult),
}

/// Grades and finalizes a session exactly once, whichever trigger arrives first.
#[derive(Clone)]
pub struct SubmissionCoordinator {
    clock: Clock,
    pipeline: GradingPipeline,
    notifier: CompletionNotifier,
    results: Arc<dyn ExamResultRepository>,
    pending: Arc<dyn PendingSkillRepository>,
    active: Arc<dyn ActiveExamRepository>,
}

impl SubmissionCoordinator {
    #[must_use]
    pub fn new(
        clock: Clock,
        pipeline: GradingPipeline,
        notifier: CompletionNotifier,
        results: Arc<dyn ExamResultRepository>,
        pending: Arc<dyn PendingSkillRepository>,
        active: Arc<dyn ActiveExamRepository>,
    ) -> Self {
        Self {
            clock,
            pipeline,
            notifier,
            results,
            pending,
            active,
        }
    }

    #[must_use]
    pub fn notifier(&self) -> &CompletionNotifier {
        &self.notifier
    }

    /// Check-and-set the session into `Submitting` and snapshot what grading needs.
    ///
    /// A session already submitting or complete is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Incomplete` for a manual submit with unanswered
    /// questions, or `InvalidTransition` for a session that never started.
    pub fn begin(
        &self,
        session: &mut ExamSession,
        trigger: SubmissionTrigger,
    ) -> Result<BeginOutcome, SubmitError> {
        if let Some(result) = session.result() {
            return Ok(BeginOutcome::AlreadyComplete(result.clone()));
        }
        if session.phase() == ExamPhase::Submitting {
            return Ok(BeginOutcome::InProgress);
        }
        if !trigger.is_forced() && !session.is_complete() {
            let progress = session.progress();
            return Err(SessionError::Incomplete {
                answered: progress.answered,
                total: progress.total,
            }
            .into());
        }

        let from = session.phase();
        if !session.begin_submission() {
            return Err(SessionError::InvalidTransition {
                from,
                to: ExamPhase::Submitting,
            }
            .into());
        }

        let local = grade_locally(session.questions(), session.answers());
        let ticket = SubmissionTicket {
            session_id: session.id(),
            trigger,
            request: GradingRequest {
                skill_id: session.skill_id(),
                answers: session.answers().clone(),
                time_taken_secs: session.elapsed_secs(),
            },
            local,
        };
        info!(
            session_id = %ticket.session_id,
            trigger = trigger.as_str(),
            answered = session.answered_count(),
            "submission started"
        );
        Ok(BeginOutcome::Started(ticket))
    }

    /// Grade a ticket. Holds no session state, so the caller may drop it midway.
    pub async fn grade(&self, ticket: &SubmissionTicket) -> GradingOutcome {
        self.pipeline.grade(&ticket.request, ticket.local).await
    }

    /// Apply `outcome` to the session the ticket was issued for.
    ///
    /// Storage side effects are logged on failure and never undo the result.
    ///
    /// # Errors
    ///
    /// Returns `SubmitError::StaleTicket` if the session was replaced or is not
    /// waiting for this grade.
    pub async fn finalize(
        &self,
        session: &mut ExamSession,
        ticket: SubmissionTicket,
        outcome: GradingOutcome,
    ) -> Result<Completion, SubmitError> {
        if ticket.session_id != session.id() || session.phase() != ExamPhase::Submitting {
            warn!(
                ticket = %ticket.session_id,
                session_id = %session.id(),
                phase = %session.phase(),
                "discarding stale grading result"
            );
            return Err(SubmitError::StaleTicket);
        }

        let result = match self.build_result(session, &ticket, &outcome) {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "graded result rejected, using local score");
                let fallback = GradingOutcome::Fallback {
                    local: ticket.local,
                    cause: err.to_string(),
                };
                self.build_result(session, &ticket, &fallback)?
            }
        };
        let result = session.complete(result)?.clone();

        if let Err(err) = self.results.append_result(&result).await {
            warn!(session_id = %result.session_id(), error = %err, "failed to store exam result");
        }
        if let Err(err) = self.pending.remove_skill(result.skill_id()).await {
            warn!(skill_id = %result.skill_id(), error = %err, "failed to dequeue skill");
        }
        if let Err(err) = self.active.clear_active(result.session_id()).await {
            warn!(session_id = %result.session_id(), error = %err, "failed to clear active exam");
        }
        self.notifier.emit(AssessmentCompleted::from(&result));

        info!(
            session_id = %result.session_id(),
            skill_id = %result.skill_id(),
            score = result.score(),
            level = %result.level(),
            source = result.source().as_str(),
            trigger = result.trigger().as_str(),
            "exam completed"
        );

        let next = self.next_step().await;
        Ok(Completion { result, next })
    }

    /// `begin`, `grade` and `finalize` in one call.
    ///
    /// # Errors
    ///
    /// See [`SubmissionCoordinator::begin`] and [`SubmissionCoordinator::finalize`].
    pub async fn submit(
        &self,
        session: &mut ExamSession,
        trigger: SubmissionTrigger,
    ) -> Result<SubmitOutcome, SubmitError> {
        match self.begin(session, trigger)? {
            BeginOutcome::Started(ticket) => {
                let outcome = self.grade(&ticket).await;
                let completion = self.finalize(session, ticket, outcome).await?;
                Ok(SubmitOutcome::Completed(completion))
            }
            BeginOutcome::InProgress => Ok(SubmitOutcome::InProgress),
            BeginOutcome::AlreadyComplete(result) => Ok(SubmitOutcome::AlreadyComplete(result)),
        }
    }

    async fn next_step(&self) -> NextStep {
        match self.pending.load_queue().await {
            Ok(queue) => queue
                .front()
                .cloned()
                .map_or(NextStep::ReturnToResults, NextStep::NextExam),
            Err(err) => {
                warn!(error = %err, "failed to read pending skills");
                NextStep::ReturnToResults
            }
        }
    }

    fn build_result(
        &self,
        session: &ExamSession,
        ticket: &SubmissionTicket,
        outcome: &GradingOutcome,
    ) -> Result<ExamResult, ResultError> {
        ExamResultDraft {
            session_id: session.id(),
            skill_id: session.skill_id(),
            skill_name: session.skill_name().to_owned(),
            score: outcome.score(),
            correct_answers: outcome.correct_answers(),
            total_questions: outcome.total_questions(),
            written_reflection: session.written_reflection().to_owned(),
            time_taken_secs: ticket.request.time_taken_secs,
            violation_count: session.violation_count(),
            trigger: ticket.trigger,
            source: outcome.source(),
            completed_at: self.clock.now(),
        }
        .validate()
    }
}

impl std::fmt::Debug for SubmissionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionCoordinator")
            .field("clock", &self.clock)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}
