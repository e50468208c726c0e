mod ids;
mod queue;
mod question;
mod result;
mod session;
mod violation;

pub use ids::{ParseIdError, QuestionId, SessionId, SkillId};
pub use queue::{PendingSkill, PendingSkillQueue};
pub use question::{Difficulty, Question, QuestionError, QuestionSet};
pub use result::{
    ExamResult, ExamResultDraft, GradeSource, Level, ResultError, SubmissionTrigger,
};
pub use session::{ExamPhase, ExamProgress, ExamSession, SessionError};
pub use violation::{ClipboardAction, Violation, ViolationKind};
