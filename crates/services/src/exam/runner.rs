//! Async driver for one exam: host events, user commands, the countdown and
//! scheduled deadlines, multiplexed on a single task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use exam_core::model::{
    ExamPhase, Question, QuestionId, SessionError, SessionId, SubmissionTrigger,
};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, interval_at, sleep_until};
use tracing::{debug, info};

use super::coordinator::{BeginOutcome, Completion, SubmissionCoordinator, SubmissionTicket};
use super::engine::{EngineEffect, ExamEngine};
use super::fullscreen::SecureMode;
use super::host::{EventDisposition, EventHost, HostEvent};
use super::monitor::SecurityMonitor;
use crate::error::{ExamError, SubmitError};

const TICK: Duration = Duration::from_secs(1);

/// User actions forwarded from the exam view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExamCommand {
    SelectAnswer { question: QuestionId, option: String },
    Next,
    Previous,
    Reflection(String),
    Submit,
    RetryFullscreen,
    /// Navigate away; the exam is abandoned, not graded.
    Leave,
}

/// Everything the view renders, published after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamSnapshot {
    pub session_id: SessionId,
    pub skill_name: String,
    pub phase: ExamPhase,
    pub cursor: usize,
    pub total_questions: usize,
    pub answered: usize,
    pub current_question: Option<Question>,
    pub selected: Option<String>,
    pub reflection_len: usize,
    pub time_remaining_secs: u32,
    pub violation_count: u32,
    pub warning: Option<String>,
    pub secure_mode: SecureMode,
    pub notice: Option<String>,
}

impl ExamSnapshot {
    fn capture(engine: &ExamEngine, notice: Option<String>) -> Self {
        let session = engine.session();
        let current_question = session.current_question().cloned();
        let selected = current_question
            .as_ref()
            .and_then(|q| session.answer_for(q.id()))
            .map(str::to_owned);
        Self {
            session_id: session.id(),
            skill_name: session.skill_name().to_owned(),
            phase: session.phase(),
            cursor: session.cursor(),
            total_questions: session.questions().len(),
            answered: session.answered_count(),
            current_question,
            selected,
            reflection_len: session.written_reflection().chars().count(),
            time_remaining_secs: session.time_remaining_secs(),
            violation_count: session.violation_count(),
            warning: engine.warning_message(),
            secure_mode: engine.secure_mode(),
            notice,
        }
    }
}

/// "An exam is in progress" flag for navigation guards.
#[derive(Debug, Clone, Default)]
pub struct ActiveExamFlag(Arc<AtomicBool>);

impl ActiveExamFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn raise(&self) -> ActiveGuard {
        self.0.store(true, Ordering::SeqCst);
        ActiveGuard(self.clone())
    }
}

struct ActiveGuard(ActiveExamFlag);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        (self.0).0.store(false, Ordering::SeqCst);
    }
}

/// Host-side end of a running exam.
#[derive(Debug, Clone)]
pub struct ExamHandle {
    events: mpsc::UnboundedSender<HostEvent>,
    commands: mpsc::UnboundedSender<ExamCommand>,
    snapshots: watch::Receiver<ExamSnapshot>,
    active: ActiveExamFlag,
}

impl ExamHandle {
    /// Forward a host event and return whether its default action must be
    /// suppressed. Once the exam is over every event is allowed.
    pub fn dispatch(&self, event: HostEvent) -> EventDisposition {
        if !self.active.is_active() {
            return EventDisposition::Allow;
        }
        let disposition = SecurityMonitor::classify(&event).disposition;
        if self.events.send(event).is_err() {
            return EventDisposition::Allow;
        }
        disposition
    }

    /// Returns `false` if the exam already ended.
    pub fn send(&self, command: ExamCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    #[must_use]
    pub fn snapshot(&self) -> ExamSnapshot {
        self.snapshots.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ExamSnapshot> {
        self.snapshots.clone()
    }

    #[must_use]
    pub fn active_flag(&self) -> &ActiveExamFlag {
        &self.active
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(Completion),
    /// Left before grading finished; nothing was recorded.
    Abandoned { session_id: SessionId },
}

#[derive(Debug, Default)]
struct Deadlines {
    warning: Option<(Instant, u64)>,
    force: Option<(Instant, SubmissionTrigger)>,
    reacquire: Option<Instant>,
}

impl Deadlines {
    fn force_at(&mut self, at: Instant, trigger: SubmissionTrigger) {
        if self.force.is_none_or(|(existing, _)| at < existing) {
            self.force = Some((at, trigger));
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

enum Step {
    Continue,
    Submit(SubmissionTrigger),
    Leave,
}

/// Drives an `ExamEngine` until it completes or is abandoned.
pub struct ExamRunner {
    engine: ExamEngine,
    coordinator: SubmissionCoordinator,
    host: Arc<dyn EventHost>,
    events: mpsc::UnboundedReceiver<HostEvent>,
    commands: mpsc::UnboundedReceiver<ExamCommand>,
    snapshots: watch::Sender<ExamSnapshot>,
    active: ActiveExamFlag,
    deadlines: Deadlines,
    notice: Option<String>,
}

impl ExamRunner {
    #[must_use]
    pub fn new(
        engine: ExamEngine,
        coordinator: SubmissionCoordinator,
        host: Arc<dyn EventHost>,
        active: ActiveExamFlag,
    ) -> (Self, ExamHandle) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(ExamSnapshot::capture(&engine, None));

        let handle = ExamHandle {
            events: event_tx,
            commands: command_tx,
            snapshots: snapshot_rx,
            active: active.clone(),
        };
        let runner = Self {
            engine,
            coordinator,
            host,
            events: event_rx,
            commands: command_rx,
            snapshots: snapshot_tx,
            active,
            deadlines: Deadlines::default(),
            notice: None,
        };
        (runner, handle)
    }

    /// Run the exam to its end.
    ///
    /// # Errors
    ///
    /// Returns `ExamError` if the exam cannot start. Once started, grading
    /// problems never surface here.
    pub async fn run(mut self) -> Result<RunOutcome, ExamError> {
        let _active = self.active.raise();
        let session_id = self.engine.session().id();

        let effects = self.engine.start(Arc::clone(&self.host)).await?;
        self.apply(effects);
        self.publish();

        let Some(trigger) = self.run_active().await else {
            self.engine.teardown().await;
            self.publish();
            info!(%session_id, "exam abandoned");
            return Ok(RunOutcome::Abandoned { session_id });
        };

        let ticket = match self.engine.begin_submission(&self.coordinator, trigger)? {
            BeginOutcome::Started(ticket) => ticket,
            // Only this task mutates the session, so a second begin cannot race.
            BeginOutcome::InProgress | BeginOutcome::AlreadyComplete(_) => {
                return Err(SubmitError::StaleTicket.into());
            }
        };
        self.publish();

        let Some(completion) = self.run_submitting(ticket).await? else {
            self.engine.teardown().await;
            self.publish();
            info!(%session_id, "exam abandoned while grading");
            return Ok(RunOutcome::Abandoned { session_id });
        };

        self.publish();
        Ok(RunOutcome::Completed(completion))
    }

    /// Loop until a submission is triggered (`Some`) or the exam is left (`None`).
    async fn run_active(&mut self) -> Option<SubmissionTrigger> {
        let mut ticker = interval_at(Instant::now() + TICK, TICK);

        loop {
            let warning = self.deadlines.warning.map(|(at, _)| at);
            let force = self.deadlines.force.map(|(at, _)| at);
            let reacquire = self.deadlines.reacquire;

            let step = tokio::select! {
                Some(event) = self.events.recv() => {
                    let report = self.engine.handle_event(&event);
                    self.apply(report.effects);
                    Step::Continue
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => Step::Leave,
                },
                _ = ticker.tick() => {
                    if let Some(effect) = self.engine.tick() {
                        self.apply([effect]);
                    }
                    Step::Continue
                }
                () = wait_until(warning) => {
                    if let Some((_, generation)) = self.deadlines.warning.take() {
                        self.engine.warning_elapsed(generation);
                    }
                    Step::Continue
                }
                () = wait_until(reacquire) => {
                    self.deadlines.reacquire = None;
                    if let Some(effect) = self.engine.reacquire_fullscreen().await {
                        self.apply([effect]);
                    }
                    Step::Continue
                }
                () = wait_until(force) => match self.deadlines.force.take() {
                    Some((_, trigger)) => Step::Submit(trigger),
                    None => Step::Continue,
                },
            };

            match step {
                Step::Continue => self.publish(),
                Step::Submit(trigger) => return Some(trigger),
                Step::Leave => return None,
            }
        }
    }

    /// Grade while still draining input. `Ok(None)` means the exam was left
    /// and the in-flight grade dropped.
    async fn run_submitting(
        &mut self,
        ticket: SubmissionTicket,
    ) -> Result<Option<Completion>, ExamError> {
        let coordinator = self.coordinator.clone();
        let outcome = {
            let grading = coordinator.grade(&ticket);
            tokio::pin!(grading);

            loop {
                tokio::select! {
                    outcome = &mut grading => break outcome,
                    Some(event) = self.events.recv() => {
                        // Phase is Submitting: the engine treats this as inert.
                        self.engine.handle_event(&event);
                    }
                    command = self.commands.recv() => match command {
                        Some(ExamCommand::Leave) | None => return Ok(None),
                        Some(other) => debug!(command = ?other, "command ignored while grading"),
                    },
                }
            }
        };

        let completion = self.engine.finalize(&coordinator, ticket, outcome).await?;
        Ok(Some(completion))
    }

    async fn on_command(&mut self, command: ExamCommand) -> Step {
        self.notice = None;
        match command {
            ExamCommand::SelectAnswer { question, option } => {
                if let Err(err) = self.engine.select_answer(question, option) {
                    self.notice = Some(err.to_string());
                }
            }
            ExamCommand::Next => {
                if !self.engine.next_question() {
                    self.notice = Some("This is the last question; submit when ready".into());
                }
            }
            ExamCommand::Previous => {
                self.engine.previous_question();
            }
            ExamCommand::Reflection(text) => {
                if let Err(err) = self.engine.record_reflection(text) {
                    self.notice = Some(err.to_string());
                }
            }
            ExamCommand::Submit => {
                let progress = self.engine.session().progress();
                if !progress.is_complete {
                    self.notice = Some(
                        SessionError::Incomplete {
                            answered: progress.answered,
                            total: progress.total,
                        }
                        .to_string(),
                    );
                    return Step::Continue;
                }
                return Step::Submit(SubmissionTrigger::Manual);
            }
            ExamCommand::RetryFullscreen => {
                self.engine.retry_fullscreen().await;
            }
            ExamCommand::Leave => return Step::Leave,
        }
        Step::Continue
    }

    fn apply(&mut self, effects: impl IntoIterator<Item = EngineEffect>) {
        let now = Instant::now();
        for effect in effects {
            match effect {
                EngineEffect::ShowWarning { .. } | EngineEffect::ManualFullscreenRequired => {}
                EngineEffect::ClearWarningAfter { generation, after } => {
                    self.deadlines.warning = Some((now + after, generation));
                }
                EngineEffect::ForceSubmit { trigger, after } => {
                    self.deadlines.warning = None;
                    self.deadlines.force_at(now + after, trigger);
                }
                EngineEffect::ReacquireFullscreen { after } => {
                    self.deadlines.reacquire = Some(now + after);
                }
            }
        }
    }

    fn publish(&self) {
        self.snapshots
            .send_replace(ExamSnapshot::capture(&self.engine, self.notice.clone()));
    }
}

impl std::fmt::Debug for ExamRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExamRunner")
            .field("engine", &self.engine)
            .field("deadlines", &self.deadlines)
            .finish_non_exhaustive()
    }
}
