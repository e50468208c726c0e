use std::time::Duration;

use exam_core::model::{ExamPhase, ExamSession, Violation};
use exam_core::policy::ProctoringPolicy;
use tracing::{debug, info, warn};

/// What the policy decided for one violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// The exam was not running; nothing changed.
    Ignored,
    /// Show the warning and clear it after `clear_after`, unless a newer
    /// warning (`generation`) replaced it.
    Warn {
        violations: u32,
        generation: u64,
        clear_after: Duration,
    },
    /// The ceiling was reached: force submission after `grace`.
    Escalate { violations: u32, grace: Duration },
    /// Counted after escalation; the forced submission is already scheduled.
    Recorded { violations: u32 },
}

/// Escalation state machine fed by the security monitor.
///
/// Works on any `ExamSession`, so it can be driven with synthetic violations.
#[derive(Debug, Clone)]
pub struct ViolationPolicy {
    policy: ProctoringPolicy,
    generation: u64,
    escalated: bool,
    last_reason: Option<String>,
}

impl ViolationPolicy {
    #[must_use]
    pub fn new(policy: ProctoringPolicy) -> Self {
        Self {
            policy,
            generation: 0,
            escalated: false,
            last_reason: None,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &ProctoringPolicy {
        &self.policy
    }

    #[must_use]
    pub fn is_escalated(&self) -> bool {
        self.escalated
    }

    pub fn on_violation(&mut self, session: &mut ExamSession, violation: &Violation) -> PolicyDecision {
        let Some(violations) = session.record_violation() else {
            debug!(phase = %session.phase(), "violation ignored");
            return PolicyDecision::Ignored;
        };
        session.enter_warning();
        self.generation += 1;
        self.last_reason = Some(violation.reason().to_owned());

        warn!(
            session_id = %session.id(),
            reason = violation.reason(),
            violations,
            "exam violation"
        );

        if self.escalated {
            return PolicyDecision::Recorded { violations };
        }

        if violations >= self.policy.violation_ceiling() {
            self.escalated = true;
            info!(
                session_id = %session.id(),
                violations,
                "violation ceiling reached, forcing submission"
            );
            return PolicyDecision::Escalate {
                violations,
                grace: self.policy.grace_period(),
            };
        }

        PolicyDecision::Warn {
            violations,
            generation: self.generation,
            clear_after: self.policy.warning_duration(),
        }
    }

    /// The warning timer for `generation` fired.
    ///
    /// Returns `true` if the session went back to `Active`. A stale generation,
    /// an escalation, or a submission in progress keeps the phase as is.
    pub fn on_warning_elapsed(&mut self, session: &mut ExamSession, generation: u64) -> bool {
        if generation != self.generation || self.escalated {
            return false;
        }
        let cleared = session.clear_warning();
        if cleared {
            debug!(session_id = %session.id(), "warning cleared");
        }
        cleared
    }

    /// Full screen came back while warned. The count is kept.
    pub fn on_fullscreen_restored(&mut self, session: &mut ExamSession) -> bool {
        if self.escalated {
            return false;
        }
        session.clear_warning()
    }

    /// Warning text for the overlay, while one is showing.
    #[must_use]
    pub fn warning_message(&self, session: &ExamSession) -> Option<String> {
        if session.phase() != ExamPhase::Warning {
            return None;
        }
        let reason = self.last_reason.as_deref()?;
        Some(format!(
            "{reason} (violation {} of {})",
            session.violation_count(),
            self.policy.violation_ceiling()
        ))
    }
}
