//! Proctored exam flow: security monitoring, escalation, full screen, the
//! countdown, grading and the async runner that ties them together.

pub mod coordinator;
pub mod engine;
pub mod fullscreen;
pub mod grading;
pub mod host;
pub mod monitor;
pub mod notify;
pub mod runner;
pub mod source;
pub mod timer;
pub mod violation_policy;

#[cfg(test)]
mod test_harness;

pub use coordinator::{
    BeginOutcome, Completion, NextStep, SubmissionCoordinator, SubmissionTicket, SubmitOutcome,
};
pub use engine::{EngineEffect, EventReport, ExamEngine};
pub use fullscreen::{FullscreenController, SecureMode};
pub use grading::{GradingClient, GradingOutcome, GradingPipeline, GradingRequest, RemoteGrade};
pub use host::{
    EventDisposition, EventHost, FieldTarget, HostEvent, Key, KeyPress, ListenerId, ListenerKind,
    Modifiers, PresentationHost,
};
pub use monitor::{SecurityMonitor, Verdict};
pub use notify::{AssessmentCompleted, CompletionNotifier};
pub use runner::{ActiveExamFlag, ExamCommand, ExamHandle, ExamRunner, ExamSnapshot, RunOutcome};
pub use source::{QuestionSetPayload, QuestionSource, StaticQuestionSource};
pub use timer::{ExamTimer, TimerTick};
pub use violation_policy::{PolicyDecision, ViolationPolicy};
