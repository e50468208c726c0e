use std::sync::Arc;
use std::time::Duration;

use exam_core::model::{ExamSession, QuestionId, SessionError, SubmissionTrigger, ViolationKind};
use exam_core::policy::ProctoringPolicy;
use tracing::debug;

use super::coordinator::{BeginOutcome, Completion, SubmissionCoordinator, SubmissionTicket};
use super::fullscreen::{FullscreenController, SecureMode};
use super::grading::GradingOutcome;
use super::host::{EventDisposition, EventHost, HostEvent, PresentationHost};
use super::monitor::SecurityMonitor;
use super::timer::{ExamTimer, TimerTick};
use super::violation_policy::{PolicyDecision, ViolationPolicy};
use crate::error::{ExamError, SubmitError};

/// Follow-up work the engine asks its driver to schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEffect {
    ShowWarning { message: String },
    ClearWarningAfter { generation: u64, after: Duration },
    ForceSubmit { trigger: SubmissionTrigger, after: Duration },
    ReacquireFullscreen { after: Duration },
    ManualFullscreenRequired,
}

/// Outcome of one host event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventReport {
    pub disposition: EventDisposition,
    pub effects: Vec<EngineEffect>,
}

/// Owns one `ExamSession` and every proctoring component wired to it.
///
/// Synchronous except for full-screen requests and finalization; timers are
/// left to the driver through `EngineEffect`s.
#[derive(Debug)]
pub struct ExamEngine {
    session: ExamSession,
    monitor: SecurityMonitor,
    policy: ViolationPolicy,
    timer: ExamTimer,
    fullscreen: FullscreenController,
}

impl ExamEngine {
    #[must_use]
    pub fn new(
        session: ExamSession,
        policy: ProctoringPolicy,
        presentation: Arc<dyn PresentationHost>,
    ) -> Self {
        Self {
            session,
            monitor: SecurityMonitor::new(),
            policy: ViolationPolicy::new(policy),
            timer: ExamTimer::new(),
            fullscreen: FullscreenController::new(presentation, &policy),
        }
    }

    #[must_use]
    pub fn session(&self) -> &ExamSession {
        &self.session
    }

    #[must_use]
    pub fn secure_mode(&self) -> SecureMode {
        self.fullscreen.mode()
    }

    #[must_use]
    pub fn warning_message(&self) -> Option<String> {
        self.policy.warning_message(&self.session)
    }

    #[must_use]
    pub fn listeners_attached(&self) -> bool {
        self.monitor.is_attached()
    }

    /// Attach listeners, start the session and request full screen.
    ///
    /// # Errors
    ///
    /// Returns `ExamError` if listeners cannot be attached or the session was
    /// already started. Nothing stays attached on failure.
    pub async fn start(&mut self, host: Arc<dyn EventHost>) -> Result<Vec<EngineEffect>, ExamError> {
        self.monitor.attach(host)?;
        if let Err(err) = self.session.begin() {
            self.monitor.detach();
            return Err(err.into());
        }
        debug!(session_id = %self.session.id(), skill_id = %self.session.skill_id(), "exam started");

        let mut effects = Vec::new();
        if self.fullscreen.enter(&mut self.session).await == SecureMode::ManualRequired {
            effects.push(EngineEffect::ManualFullscreenRequired);
        }
        Ok(effects)
    }

    pub fn handle_event(&mut self, event: &HostEvent) -> EventReport {
        let verdict = self.monitor.inspect(&self.session, event);
        let mut effects = Vec::new();

        if matches!(event, HostEvent::FullscreenChanged { active: true })
            && self.session.phase().is_running()
        {
            self.fullscreen.on_restored(&mut self.session);
            self.policy.on_fullscreen_restored(&mut self.session);
        }

        if let Some(violation) = verdict.violation {
            if violation.kind() == ViolationKind::FullscreenExit {
                effects.push(match self.fullscreen.on_involuntary_exit(&mut self.session) {
                    Some(after) => EngineEffect::ReacquireFullscreen { after },
                    None => EngineEffect::ManualFullscreenRequired,
                });
            }

            match self.policy.on_violation(&mut self.session, &violation) {
                PolicyDecision::Warn {
                    generation,
                    clear_after,
                    ..
                } => {
                    effects.extend(self.show_warning());
                    effects.push(EngineEffect::ClearWarningAfter {
                        generation,
                        after: clear_after,
                    });
                }
                PolicyDecision::Escalate { grace, .. } => {
                    effects.extend(self.show_warning());
                    effects.push(EngineEffect::ForceSubmit {
                        trigger: SubmissionTrigger::ViolationCeiling,
                        after: grace,
                    });
                }
                PolicyDecision::Recorded { .. } => effects.extend(self.show_warning()),
                PolicyDecision::Ignored => {}
            }
        }

        EventReport {
            disposition: verdict.disposition,
            effects,
        }
    }

    /// One second of the countdown.
    pub fn tick(&mut self) -> Option<EngineEffect> {
        match self.timer.tick(&mut self.session) {
            TimerTick::Expired => Some(EngineEffect::ForceSubmit {
                trigger: SubmissionTrigger::TimerExpired,
                after: Duration::ZERO,
            }),
            TimerTick::Running { .. } | TimerTick::Suspended => None,
        }
    }

    pub fn warning_elapsed(&mut self, generation: u64) -> bool {
        self.policy.on_warning_elapsed(&mut self.session, generation)
    }

    pub async fn reacquire_fullscreen(&mut self) -> Option<EngineEffect> {
        match self.fullscreen.reacquire(&mut self.session).await {
            SecureMode::ManualRequired => Some(EngineEffect::ManualFullscreenRequired),
            _ => None,
        }
    }

    pub async fn retry_fullscreen(&mut self) -> SecureMode {
        self.fullscreen.manual_retry(&mut self.session).await
    }

    /// # Errors
    ///
    /// Returns `SessionError` when the exam is not running or the answer does
    /// not belong to the question.
    pub fn select_answer(
        &mut self,
        question: QuestionId,
        option: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.session.select_answer(question, option)
    }

    pub fn next_question(&mut self) -> bool {
        self.session.advance()
    }

    pub fn previous_question(&mut self) -> bool {
        self.session.retreat()
    }

    /// # Errors
    ///
    /// Returns `SessionError::Closed` once grading has started.
    pub fn record_reflection(&mut self, text: impl Into<String>) -> Result<(), SessionError> {
        self.session.record_reflection(text)
    }

    /// # Errors
    ///
    /// See [`SubmissionCoordinator::begin`].
    pub fn begin_submission(
        &mut self,
        coordinator: &SubmissionCoordinator,
        trigger: SubmissionTrigger,
    ) -> Result<BeginOutcome, SubmitError> {
        let outcome = coordinator.begin(&mut self.session, trigger)?;
        if matches!(outcome, BeginOutcome::Started(_)) {
            self.timer.stop();
        }
        Ok(outcome)
    }

    /// Finalize and release every host resource.
    ///
    /// # Errors
    ///
    /// Returns `SubmitError::StaleTicket` for a ticket of another session.
    pub async fn finalize(
        &mut self,
        coordinator: &SubmissionCoordinator,
        ticket: SubmissionTicket,
        outcome: GradingOutcome,
    ) -> Result<Completion, SubmitError> {
        let completion = coordinator.finalize(&mut self.session, ticket, outcome).await?;
        self.teardown().await;
        Ok(completion)
    }

    /// Detach listeners, stop the countdown and leave full screen.
    pub async fn teardown(&mut self) {
        self.monitor.detach();
        self.timer.stop();
        self.fullscreen.release().await;
    }

    fn show_warning(&self) -> Option<EngineEffect> {
        self.warning_message()
            .map(|message| EngineEffect::ShowWarning { message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exam::grading::GradingPipeline;
    use crate::exam::host::{FieldTarget, Key, KeyPress, ListenerKind, Modifiers};
    use crate::exam::notify::CompletionNotifier;
    use crate::exam::test_harness::{RecordingHost, ScriptedPresentation, loading_session};
    use exam_core::model::{ClipboardAction, ExamPhase};
    use exam_core::time::fixed_clock;
    use storage::repository::Storage;

    async fn started(n: u64) -> (ExamEngine, Arc<RecordingHost>, Arc<ScriptedPresentation>) {
        let host = RecordingHost::new();
        let presentation = ScriptedPresentation::granting();
        let mut engine = ExamEngine::new(
            loading_session(n),
            ProctoringPolicy::default(),
            presentation.clone(),
        );
        let effects = engine.start(host.clone()).await.unwrap();
        assert!(effects.is_empty());
        assert!(engine.listeners_attached());
        (engine, host, presentation)
    }

    fn coordinator() -> SubmissionCoordinator {
        let storage = Storage::in_memory();
        SubmissionCoordinator::new(
            fixed_clock(),
            GradingPipeline::local_only(),
            CompletionNotifier::default(),
            storage.results,
            storage.pending,
            storage.active,
        )
    }

    fn ctrl_c() -> HostEvent {
        HostEvent::KeyDown(KeyPress::new(Key::Char('c'), Modifiers::ctrl()))
    }

    #[tokio::test]
    async fn ceiling_scenario_forces_one_submission() {
        let (mut engine, _host, _presentation) = started(2).await;

        let first = engine.handle_event(&HostEvent::ContextMenu);
        assert_eq!(first.disposition, EventDisposition::Prevent);
        assert!(first.effects.iter().any(|e| matches!(
            e,
            EngineEffect::ClearWarningAfter { generation: 1, .. }
        )));

        engine.handle_event(&HostEvent::WindowBlur);
        let third = engine.handle_event(&ctrl_c());
        assert_eq!(engine.session().violation_count(), 3);
        let forced: Vec<_> = third
            .effects
            .iter()
            .filter(|e| matches!(e, EngineEffect::ForceSubmit { .. }))
            .collect();
        assert_eq!(
            forced,
            vec![&EngineEffect::ForceSubmit {
                trigger: SubmissionTrigger::ViolationCeiling,
                after: Duration::from_secs(2),
            }]
        );

        let fourth = engine.handle_event(&HostEvent::WindowBlur);
        assert!(!fourth
            .effects
            .iter()
            .any(|e| matches!(e, EngineEffect::ForceSubmit { .. })));
    }

    #[tokio::test]
    async fn events_after_completion_are_inert() {
        let (mut engine, host, presentation) = started(1).await;
        let coordinator = coordinator();

        let BeginOutcome::Started(ticket) = engine
            .begin_submission(&coordinator, SubmissionTrigger::TimerExpired)
            .unwrap()
        else {
            panic!("expected a ticket");
        };
        let outcome = coordinator.grade(&ticket).await;
        engine.finalize(&coordinator, ticket, outcome).await.unwrap();

        assert_eq!(engine.session().phase(), ExamPhase::Complete);
        assert_eq!(host.active_count(), 0);
        assert_eq!(presentation.exits(), 1);

        for event in [
            ctrl_c(),
            HostEvent::WindowBlur,
            HostEvent::VisibilityChanged { hidden: true },
            HostEvent::Clipboard {
                action: ClipboardAction::Copy,
                target: FieldTarget::Question,
            },
        ] {
            let report = engine.handle_event(&event);
            assert_eq!(report.disposition, EventDisposition::Allow);
            assert!(report.effects.is_empty());
        }
        assert_eq!(engine.session().violation_count(), 0);
        assert_eq!(engine.session().phase(), ExamPhase::Complete);
        assert!(engine.tick().is_none());
    }

    #[tokio::test]
    async fn fullscreen_exit_schedules_silent_reacquire() {
        let (mut engine, _host, presentation) = started(1).await;

        let report = engine.handle_event(&HostEvent::FullscreenChanged { active: false });
        assert!(report.effects.contains(&EngineEffect::ReacquireFullscreen {
            after: Duration::from_secs(1)
        }));
        assert_eq!(engine.secure_mode(), SecureMode::Reacquiring);

        presentation.set_deny(true);
        assert_eq!(
            engine.reacquire_fullscreen().await,
            Some(EngineEffect::ManualFullscreenRequired)
        );

        presentation.set_deny(false);
        assert_eq!(engine.retry_fullscreen().await, SecureMode::Secured);

        engine.handle_event(&HostEvent::FullscreenChanged { active: true });
        assert_eq!(engine.session().phase(), ExamPhase::Active);
        assert_eq!(engine.session().violation_count(), 1);
    }

    #[tokio::test]
    async fn denied_fullscreen_does_not_block_the_exam() {
        let host = RecordingHost::new();
        let mut engine = ExamEngine::new(
            loading_session(1),
            ProctoringPolicy::default(),
            ScriptedPresentation::denying(),
        );
        let effects = engine.start(host.clone()).await.unwrap();
        assert_eq!(effects, vec![EngineEffect::ManualFullscreenRequired]);
        assert_eq!(engine.session().phase(), ExamPhase::Active);
        engine.select_answer(QuestionId::new(1), "A").unwrap();
    }

    #[tokio::test]
    async fn failed_attach_leaves_session_loading() {
        let host = RecordingHost::failing_on(ListenerKind::Clipboard);
        let mut engine = ExamEngine::new(
            loading_session(1),
            ProctoringPolicy::default(),
            ScriptedPresentation::granting(),
        );
        assert!(engine.start(host.clone()).await.is_err());
        assert_eq!(engine.session().phase(), ExamPhase::Loading);
        assert_eq!(host.active_count(), 0);
    }
}
