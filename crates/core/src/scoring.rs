//! Local grading used when the server cannot grade an exam.

use std::collections::BTreeMap;

use crate::model::{Level, Question, QuestionId};

/// Outcome of grading answers against the loaded question set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalGrade {
    pub correct: u32,
    pub total: u32,
    pub score: f64,
}

impl LocalGrade {
    #[must_use]
    pub fn level(&self) -> Level {
        Level::from_score(self.score)
    }
}

/// Grade `answers` with exact string equality against each correct answer.
///
/// Unanswered questions count as wrong.
#[must_use]
pub fn grade_locally(questions: &[Question], answers: &BTreeMap<QuestionId, String>) -> LocalGrade {
    let correct = questions
        .iter()
        .filter(|q| answers.get(&q.id()).is_some_and(|a| q.is_correct(a)))
        .count();
    let correct = u32::try_from(correct).unwrap_or(u32::MAX);
    let total = u32::try_from(questions.len()).unwrap_or(u32::MAX);

    LocalGrade {
        correct,
        total,
        score: percentage(correct, total),
    }
}

/// `correct / total * 100`, rounded to one decimal. Zero questions score 0.
#[must_use]
pub fn percentage(correct: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_one_decimal(f64::from(correct) / f64::from(total) * 100.0)
}

/// Round to one decimal place and clamp to `0..=100`.
#[must_use]
pub fn round_one_decimal(value: f64) -> f64 {
    ((value * 10.0).round() / 10.0).clamp(0.0, 100.0)
}
