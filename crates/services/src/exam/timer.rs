use exam_core::model::ExamSession;
use tracing::info;

/// Result of one countdown tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTick {
    Running { remaining: u32 },
    /// Hit zero on this tick: force submission.
    Expired,
    /// Not counting (not started, or stopped for good).
    Suspended,
}

/// One-second countdown over the session's remaining time.
///
/// Stops for good once it expires or the session is closed, so a late tick
/// can never reach a finished session.
#[derive(Debug, Default)]
pub struct ExamTimer {
    stopped: bool,
}

impl ExamTimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn tick(&mut self, session: &mut ExamSession) -> TimerTick {
        if self.stopped {
            return TimerTick::Suspended;
        }
        match session.tick_second() {
            Some(0) => {
                self.stopped = true;
                info!(session_id = %session.id(), "exam time expired");
                TimerTick::Expired
            }
            Some(remaining) => TimerTick::Running { remaining },
            None => {
                if session.phase().is_closed() {
                    self.stopped = true;
                }
                TimerTick::Suspended
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exam::test_harness::{active_session, loading_session, question_set, sql_skill};
    use exam_core::time::fixed_now;

    #[test]
    fn last_second_expires_even_with_no_answers() {
        let mut session = ExamSession::new(sql_skill(), question_set(3, 1), fixed_now());
        session.begin().unwrap();
        let mut timer = ExamTimer::new();

        assert_eq!(timer.tick(&mut session), TimerTick::Expired);
        assert_eq!(session.answered_count(), 0);
        assert_eq!(timer.tick(&mut session), TimerTick::Suspended);
    }

    #[test]
    fn counts_down_while_running() {
        let mut session = active_session(1);
        let mut timer = ExamTimer::new();
        assert_eq!(timer.tick(&mut session), TimerTick::Running { remaining: 59 });
        session.enter_warning();
        assert_eq!(timer.tick(&mut session), TimerTick::Running { remaining: 58 });
    }

    #[test]
    fn closed_session_stops_the_timer() {
        let mut session = active_session(1);
        let mut timer = ExamTimer::new();
        assert!(session.begin_submission());
        assert_eq!(timer.tick(&mut session), TimerTick::Suspended);
        assert!(timer.is_stopped());
        assert_eq!(session.time_remaining_secs(), 60);
    }

    #[test]
    fn loading_session_does_not_stop_the_timer() {
        let mut session = loading_session(1);
        let mut timer = ExamTimer::new();
        assert_eq!(timer.tick(&mut session), TimerTick::Suspended);
        assert!(!timer.is_stopped());
    }
}
