use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::model::ids::{QuestionId, SessionId, SkillId};
use crate::model::queue::PendingSkill;
use crate::model::question::{Question, QuestionSet};
use crate::model::result::ExamResult;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("exam session no longer accepts input (phase: {0})")]
    Closed(ExamPhase),

    #[error("question {0} is not part of this exam")]
    UnknownQuestion(QuestionId),

    #[error("option {option:?} is not offered by question {question}")]
    UnknownOption { question: QuestionId, option: String },

    #[error("invalid phase transition {from} -> {to}")]
    InvalidTransition { from: ExamPhase, to: ExamPhase },

    #[error("{answered} of {total} questions answered")]
    Incomplete { answered: usize, total: usize },
}

//
// ─── PHASE ─────────────────────────────────────────────────────────────────────
//

/// Lifecycle of an exam session.
///
/// Transitions only move forward, except `Active <-> Warning` which may cycle
/// until the terminal `Submitting -> Complete` path is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExamPhase {
    Loading,
    Active,
    Warning,
    Submitting,
    Complete,
}

impl ExamPhase {
    #[must_use]
    pub fn can_transition_to(self, next: ExamPhase) -> bool {
        use ExamPhase::{Active, Complete, Loading, Submitting, Warning};
        matches!(
            (self, next),
            (Loading, Active)
                | (Active, Warning)
                | (Warning, Active)
                | (Warning, Warning)
                | (Active | Warning, Submitting)
                | (Submitting, Complete)
        )
    }

    /// `Active` or `Warning`: the exam is running and the user may interact.
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, ExamPhase::Active | ExamPhase::Warning)
    }

    /// `Submitting` or `Complete`: grading has started or finished.
    #[must_use]
    pub fn is_closed(self) -> bool {
        matches!(self, ExamPhase::Submitting | ExamPhase::Complete)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ExamPhase::Loading => "loading",
            ExamPhase::Active => "active",
            ExamPhase::Warning => "warning",
            ExamPhase::Submitting => "submitting",
            ExamPhase::Complete => "complete",
        }
    }
}

impl fmt::Display for ExamPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── PROGRESS ──────────────────────────────────────────────────────────────────
//

/// Aggregated view of exam progress, useful for UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExamProgress {
    pub total: usize,
    pub answered: usize,
    pub cursor: usize,
    pub is_complete: bool,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// Aggregate root for one proctored skill exam.
///
/// Owned exclusively by the host view. Once the phase is `Complete`, answers,
/// the violation count and the remaining time are frozen.
pub struct ExamSession {
    id: SessionId,
    skill_id: SkillId,
    skill_name: String,
    questions: Vec<Question>,
    answers: BTreeMap<QuestionId, String>,
    cursor: usize,
    written_reflection: String,
    time_limit_secs: u32,
    time_remaining_secs: u32,
    violation_count: u32,
    phase: ExamPhase,
    is_fullscreen: bool,
    started_at: DateTime<Utc>,
    result: Option<ExamResult>,
}

impl ExamSession {
    /// Create a session in `Loading` for a freshly loaded question set.
    ///
    /// `started_at` should come from the services layer clock.
    #[must_use]
    pub fn new(skill: PendingSkill, set: QuestionSet, started_at: DateTime<Utc>) -> Self {
        let (questions, time_limit_secs) = set.into_parts();
        Self {
            id: SessionId::generate(),
            skill_id: skill.skill_id,
            skill_name: skill.skill_name,
            questions,
            answers: BTreeMap::new(),
            cursor: 0,
            written_reflection: String::new(),
            time_limit_secs,
            time_remaining_secs: time_limit_secs,
            violation_count: 0,
            phase: ExamPhase::Loading,
            is_fullscreen: false,
            started_at,
            result: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn skill_id(&self) -> SkillId {
        self.skill_id
    }

    #[must_use]
    pub fn skill_name(&self) -> &str {
        &self.skill_name
    }

    #[must_use]
    pub fn pending_skill(&self) -> PendingSkill {
        PendingSkill::new(self.skill_id, self.skill_name.clone())
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<QuestionId, String> {
        &self.answers
    }

    #[must_use]
    pub fn answer_for(&self, question: QuestionId) -> Option<&str> {
        self.answers.get(&question).map(String::as_str)
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.cursor)
    }

    #[must_use]
    pub fn written_reflection(&self) -> &str {
        &self.written_reflection
    }

    #[must_use]
    pub fn time_limit_secs(&self) -> u32 {
        self.time_limit_secs
    }

    #[must_use]
    pub fn time_remaining_secs(&self) -> u32 {
        self.time_remaining_secs
    }

    /// Seconds consumed so far, measured by the countdown.
    #[must_use]
    pub fn elapsed_secs(&self) -> u32 {
        self.time_limit_secs.saturating_sub(self.time_remaining_secs)
    }

    #[must_use]
    pub fn violation_count(&self) -> u32 {
        self.violation_count
    }

    #[must_use]
    pub fn phase(&self) -> ExamPhase {
        self.phase
    }

    #[must_use]
    pub fn is_fullscreen(&self) -> bool {
        self.is_fullscreen
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn result(&self) -> Option<&ExamResult> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    /// True iff every question has a recorded answer.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.questions
            .iter()
            .all(|q| self.answers.contains_key(&q.id()))
    }

    #[must_use]
    pub fn progress(&self) -> ExamProgress {
        ExamProgress {
            total: self.questions.len(),
            answered: self.answered_count(),
            cursor: self.cursor,
            is_complete: self.is_complete(),
        }
    }

    // ─── Question/answer operations ────────────────────────────────────────────

    /// Record or overwrite the answer for `question`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` unless the exam is running, and
    /// `UnknownQuestion` / `UnknownOption` for answers that do not fit the set.
    pub fn select_answer(
        &mut self,
        question: QuestionId,
        option: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.ensure_running()?;
        let option = option.into();
        let q = self
            .questions
            .iter()
            .find(|q| q.id() == question)
            .ok_or(SessionError::UnknownQuestion(question))?;
        if !q.has_option(&option) {
            return Err(SessionError::UnknownOption { question, option });
        }
        self.answers.insert(question, option);
        Ok(())
    }

    /// Move to the next question. Returns `false` at the last question.
    pub fn advance(&mut self) -> bool {
        if self.phase.is_closed() || self.cursor + 1 >= self.questions.len() {
            return false;
        }
        self.cursor += 1;
        true
    }

    /// Move to the previous question. Returns `false` at the first question.
    pub fn retreat(&mut self) -> bool {
        if self.phase.is_closed() || self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        true
    }

    /// Store the free-text reflection for the whole skill.
    ///
    /// No length limit is enforced; callers may display `written_reflection().len()`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` once grading has started, since the
    /// reflection is captured into the result at that point.
    pub fn record_reflection(&mut self, text: impl Into<String>) -> Result<(), SessionError> {
        if self.phase.is_closed() {
            return Err(SessionError::Closed(self.phase));
        }
        self.written_reflection = text.into();
        Ok(())
    }

    // ─── Lifecycle ─────────────────────────────────────────────────────────────

    /// `Loading -> Active`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` if the session already started.
    pub fn begin(&mut self) -> Result<(), SessionError> {
        self.transition(ExamPhase::Active)
    }

    /// Count one violation. Returns the new total, or `None` if the exam is not running.
    pub fn record_violation(&mut self) -> Option<u32> {
        if !self.phase.is_running() {
            return None;
        }
        self.violation_count = self.violation_count.saturating_add(1);
        Some(self.violation_count)
    }

    /// Show the warning overlay. Returns `false` if the exam is not running.
    pub fn enter_warning(&mut self) -> bool {
        self.transition(ExamPhase::Warning).is_ok()
    }

    /// Leave the warning overlay. Returns `false` unless currently in `Warning`.
    pub fn clear_warning(&mut self) -> bool {
        self.phase == ExamPhase::Warning && self.transition(ExamPhase::Active).is_ok()
    }

    pub fn set_fullscreen(&mut self, active: bool) {
        if self.phase != ExamPhase::Complete {
            self.is_fullscreen = active;
        }
    }

    /// Consume one second of the countdown.
    ///
    /// Returns the remaining seconds, or `None` when the exam is not running.
    pub fn tick_second(&mut self) -> Option<u32> {
        if !self.phase.is_running() {
            return None;
        }
        self.time_remaining_secs = self.time_remaining_secs.saturating_sub(1);
        Some(self.time_remaining_secs)
    }

    /// Check-and-set into `Submitting`. Returns `false` if grading already began.
    pub fn begin_submission(&mut self) -> bool {
        self.transition(ExamPhase::Submitting).is_ok()
    }

    /// `Submitting -> Complete`, storing the result.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` unless the session is `Submitting`.
    pub fn complete(&mut self, result: ExamResult) -> Result<&ExamResult, SessionError> {
        self.transition(ExamPhase::Complete)?;
        self.is_fullscreen = false;
        Ok(self.result.insert(result))
    }

    fn ensure_running(&self) -> Result<(), SessionError> {
        if self.phase.is_running() {
            Ok(())
        } else {
            Err(SessionError::Closed(self.phase))
        }
    }

    fn transition(&mut self, next: ExamPhase) -> Result<(), SessionError> {
        if !self.phase.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        Ok(())
    }
}

impl fmt::Debug for ExamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamSession")
            .field("id", &self.id)
            .field("skill_id", &self.skill_id)
            .field("questions_len", &self.questions.len())
            .field("answered", &self.answers.len())
            .field("cursor", &self.cursor)
            .field("time_remaining_secs", &self.time_remaining_secs)
            .field("violation_count", &self.violation_count)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
