use exam_core::model::{ExamResult, Level, SessionId, SkillId};
use tokio::sync::broadcast;
use tracing::debug;

const DEFAULT_CAPACITY: usize = 16;

/// Emitted once per finished exam for dashboard listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentCompleted {
    pub session_id: SessionId,
    pub skill_id: SkillId,
    pub skill_name: String,
    pub score: f64,
    pub level: Level,
}

impl From<&ExamResult> for AssessmentCompleted {
    fn from(result: &ExamResult) -> Self {
        Self {
            session_id: result.session_id(),
            skill_id: result.skill_id(),
            skill_name: result.skill_name().to_owned(),
            score: result.score(),
            level: result.level(),
        }
    }
}

/// Fire-and-forget fan-out of completion events.
#[derive(Debug, Clone)]
pub struct CompletionNotifier {
    sender: broadcast::Sender<AssessmentCompleted>,
}

impl Default for CompletionNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl CompletionNotifier {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AssessmentCompleted> {
        self.sender.subscribe()
    }

    /// Returns how many subscribers received the event.
    pub fn emit(&self, event: AssessmentCompleted) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("assessment completed with no listeners");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> AssessmentCompleted {
        AssessmentCompleted {
            session_id: SessionId::generate(),
            skill_id: SkillId::new(1),
            skill_name: "SQL".into(),
            score: 60.0,
            level: Level::Advanced,
        }
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let notifier = CompletionNotifier::default();
        let mut rx = notifier.subscribe();
        let sent = event();
        assert_eq!(notifier.emit(sent.clone()), 1);
        assert_eq!(rx.recv().await.unwrap(), sent);
    }

    #[test]
    fn emitting_without_listeners_is_fine() {
        assert_eq!(CompletionNotifier::new(0).emit(event()), 0);
    }
}
