use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{SessionId, SkillId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ResultError {
    #[error("score must be within 0..=100, got {0}")]
    ScoreOutOfRange(f64),

    #[error("correct answers ({correct}) exceed total questions ({total})")]
    CorrectExceedsTotal { correct: u32, total: u32 },

    #[error("unknown label: {0}")]
    UnknownLabel(String),
}

//
// ─── LEVEL ─────────────────────────────────────────────────────────────────────
//

/// Proficiency label derived from a final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl Level {
    /// Fixed thresholds: `>= 80` Expert, `>= 60` Advanced, `>= 40` Intermediate.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Level::Expert
        } else if score >= 60.0 {
            Level::Advanced
        } else if score >= 40.0 {
            Level::Intermediate
        } else {
            Level::Beginner
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Beginner => "Beginner",
            Level::Intermediate => "Intermediate",
            Level::Advanced => "Advanced",
            Level::Expert => "Expert",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ResultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Beginner" => Ok(Level::Beginner),
            "Intermediate" => Ok(Level::Intermediate),
            "Advanced" => Ok(Level::Advanced),
            "Expert" => Ok(Level::Expert),
            other => Err(ResultError::UnknownLabel(other.to_owned())),
        }
    }
}

//
// ─── PROVENANCE ────────────────────────────────────────────────────────────────
//

/// What caused the exam to be submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionTrigger {
    Manual,
    TimerExpired,
    ViolationCeiling,
}

impl SubmissionTrigger {
    #[must_use]
    pub fn is_forced(self) -> bool {
        !matches!(self, SubmissionTrigger::Manual)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionTrigger::Manual => "manual",
            SubmissionTrigger::TimerExpired => "timer_expired",
            SubmissionTrigger::ViolationCeiling => "violation_ceiling",
        }
    }
}

impl fmt::Display for SubmissionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionTrigger {
    type Err = ResultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(SubmissionTrigger::Manual),
            "timer_expired" => Ok(SubmissionTrigger::TimerExpired),
            "violation_ceiling" => Ok(SubmissionTrigger::ViolationCeiling),
            other => Err(ResultError::UnknownLabel(other.to_owned())),
        }
    }
}

/// Whether the score came from the server or from the local fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeSource {
    Authoritative,
    Fallback,
}

impl GradeSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            GradeSource::Authoritative => "authoritative",
            GradeSource::Fallback => "fallback",
        }
    }
}

impl FromStr for GradeSource {
    type Err = ResultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authoritative" => Ok(GradeSource::Authoritative),
            "fallback" => Ok(GradeSource::Fallback),
            other => Err(ResultError::UnknownLabel(other.to_owned())),
        }
    }
}

//
// ─── EXAM RESULT ───────────────────────────────────────────────────────────────
//

/// Raw fields for building an `ExamResult`.
///
/// `level` is not part of the draft: it is always derived from `score`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamResultDraft {
    pub session_id: SessionId,
    pub skill_id: SkillId,
    pub skill_name: String,
    pub score: f64,
    pub correct_answers: u32,
    pub total_questions: u32,
    pub written_reflection: String,
    pub time_taken_secs: u32,
    pub violation_count: u32,
    pub trigger: SubmissionTrigger,
    pub source: GradeSource,
    pub completed_at: DateTime<Utc>,
}

impl ExamResultDraft {
    /// # Errors
    ///
    /// Returns `ResultError` if the score or counts are inconsistent.
    pub fn validate(self) -> Result<ExamResult, ResultError> {
        if !self.score.is_finite() || !(0.0..=100.0).contains(&self.score) {
            return Err(ResultError::ScoreOutOfRange(self.score));
        }
        if self.correct_answers > self.total_questions {
            return Err(ResultError::CorrectExceedsTotal {
                correct: self.correct_answers,
                total: self.total_questions,
            });
        }

        Ok(ExamResult {
            level: Level::from_score(self.score),
            session_id: self.session_id,
            skill_id: self.skill_id,
            skill_name: self.skill_name,
            score: self.score,
            correct_answers: self.correct_answers,
            total_questions: self.total_questions,
            written_reflection: self.written_reflection,
            time_taken_secs: self.time_taken_secs,
            violation_count: self.violation_count,
            trigger: self.trigger,
            source: self.source,
            completed_at: self.completed_at,
        })
    }
}

/// The single artifact produced by a finished exam session. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamResult {
    session_id: SessionId,
    skill_id: SkillId,
    skill_name: String,
    score: f64,
    level: Level,
    correct_answers: u32,
    total_questions: u32,
    written_reflection: String,
    time_taken_secs: u32,
    violation_count: u32,
    trigger: SubmissionTrigger,
    source: GradeSource,
    completed_at: DateTime<Utc>,
}

impl ExamResult {
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
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
    pub fn score(&self) -> f64 {
        self.score
    }

    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }

    #[must_use]
    pub fn correct_answers(&self) -> u32 {
        self.correct_answers
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn written_reflection(&self) -> &str {
        &self.written_reflection
    }

    #[must_use]
    pub fn time_taken_secs(&self) -> u32 {
        self.time_taken_secs
    }

    #[must_use]
    pub fn violation_count(&self) -> u32 {
        self.violation_count
    }

    #[must_use]
    pub fn trigger(&self) -> SubmissionTrigger {
        self.trigger
    }

    #[must_use]
    pub fn source(&self) -> GradeSource {
        self.source
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn draft(score: f64, correct: u32, total: u32) -> ExamResultDraft {
        ExamResultDraft {
            session_id: SessionId::generate(),
            skill_id: SkillId::new(1),
            skill_name: "SQL".into(),
            score,
            correct_answers: correct,
            total_questions: total,
            written_reflection: String::new(),
            time_taken_secs: 30,
            violation_count: 0,
            trigger: SubmissionTrigger::Manual,
            source: GradeSource::Fallback,
            completed_at: fixed_now(),
        }
    }

    #[test]
    fn level_thresholds_are_inclusive() {
        assert_eq!(Level::from_score(100.0), Level::Expert);
        assert_eq!(Level::from_score(80.0), Level::Expert);
        assert_eq!(Level::from_score(79.9), Level::Advanced);
        assert_eq!(Level::from_score(60.0), Level::Advanced);
        assert_eq!(Level::from_score(40.0), Level::Intermediate);
        assert_eq!(Level::from_score(39.9), Level::Beginner);
        assert_eq!(Level::from_score(0.0), Level::Beginner);
    }

    #[test]
    fn level_is_derived_from_score() {
        let result = draft(85.0, 17, 20).validate().unwrap();
        assert_eq!(result.level(), Level::Expert);
    }

    #[test]
    fn out_of_range_score_is_rejected() {
        assert!(matches!(
            draft(120.0, 1, 1).validate(),
            Err(ResultError::ScoreOutOfRange(_))
        ));
        assert!(matches!(
            draft(f64::NAN, 1, 1).validate(),
            Err(ResultError::ScoreOutOfRange(_))
        ));
    }

    #[test]
    fn correct_cannot_exceed_total() {
        assert_eq!(
            draft(50.0, 4, 3).validate().unwrap_err(),
            ResultError::CorrectExceedsTotal {
                correct: 4,
                total: 3
            }
        );
    }

    #[test]
    fn labels_roundtrip() {
        for trigger in [
            SubmissionTrigger::Manual,
            SubmissionTrigger::TimerExpired,
            SubmissionTrigger::ViolationCeiling,
        ] {
            assert_eq!(trigger.as_str().parse::<SubmissionTrigger>().unwrap(), trigger);
        }
        assert_eq!("Advanced".parse::<Level>().unwrap(), Level::Advanced);
        assert_eq!(
            "fallback".parse::<GradeSource>().unwrap(),
            GradeSource::Fallback
        );
    }
}
