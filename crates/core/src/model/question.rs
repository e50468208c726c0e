use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question {0} has empty text")]
    EmptyText(QuestionId),

    #[error("question {0} has no options")]
    NoOptions(QuestionId),

    #[error("question {0} appears more than once")]
    DuplicateId(QuestionId),

    #[error("question set is empty")]
    EmptySet,

    #[error("time limit must be > 0 seconds")]
    ZeroTimeLimit,

    #[error("unknown difficulty: {0}")]
    UnknownDifficulty(String),
}

//
// ─── DIFFICULTY ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" | "beginner" => Ok(Difficulty::Easy),
            "medium" | "intermediate" => Ok(Difficulty::Medium),
            "hard" | "advanced" | "expert" => Ok(Difficulty::Hard),
            other => Err(QuestionError::UnknownDifficulty(other.to_owned())),
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A single multiple-choice question.
///
/// Option order is preserved exactly as delivered; `correct_answer` holds the
/// text of the correct option, not its index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    id: QuestionId,
    text: String,
    options: Vec<String>,
    correct_answer: String,
    difficulty: Difficulty,
}

impl Question {
    /// Build a validated question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyText` for blank question text and
    /// `QuestionError::NoOptions` when no options are supplied.
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        options: Vec<String>,
        correct_answer: impl Into<String>,
        difficulty: Difficulty,
    ) -> Result<Self, QuestionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QuestionError::EmptyText(id));
        }
        if options.is_empty() {
            return Err(QuestionError::NoOptions(id));
        }

        Ok(Self {
            id,
            text,
            options,
            correct_answer: correct_answer.into(),
            difficulty,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn correct_answer(&self) -> &str {
        &self.correct_answer
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }

    /// Exact match against the correct answer text.
    ///
    /// Case and surrounding whitespace are significant.
    #[must_use]
    pub fn is_correct(&self, answer: &str) -> bool {
        self.correct_answer == answer
    }
}

//
// ─── QUESTION SET ──────────────────────────────────────────────────────────────
//

/// The loaded payload for one skill exam: ordered questions plus the time limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionSet {
    questions: Vec<Question>,
    time_limit_secs: u32,
}

impl QuestionSet {
    /// # Errors
    ///
    /// Returns `QuestionError::EmptySet`, `QuestionError::ZeroTimeLimit` or
    /// `QuestionError::DuplicateId` when the payload cannot back an exam.
    pub fn new(questions: Vec<Question>, time_limit_secs: u32) -> Result<Self, QuestionError> {
        if questions.is_empty() {
            return Err(QuestionError::EmptySet);
        }
        if time_limit_secs == 0 {
            return Err(QuestionError::ZeroTimeLimit);
        }

        let mut seen = HashSet::with_capacity(questions.len());
        for question in &questions {
            if !seen.insert(question.id()) {
                return Err(QuestionError::DuplicateId(question.id()));
            }
        }

        Ok(Self {
            questions,
            time_limit_secs,
        })
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn time_limit_secs(&self) -> u32 {
        self.time_limit_secs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    #[must_use]
    pub fn into_parts(self) -> (Vec<Question>, u32) {
        (self.questions, self.time_limit_secs)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: u64) -> Question {
        Question::new(
            QuestionId::new(id),
            format!("Q{id}"),
            vec!["SELECT".into(), "select".into()],
            "SELECT",
            Difficulty::Medium,
        )
        .unwrap()
    }

    #[test]
    fn blank_text_is_rejected() {
        let err = Question::new(
            QuestionId::new(1),
            "  ",
            vec!["a".into()],
            "a",
            Difficulty::Easy,
        )
        .unwrap_err();
        assert_eq!(err, QuestionError::EmptyText(QuestionId::new(1)));
    }

    #[test]
    fn question_without_options_is_rejected() {
        let err = Question::new(QuestionId::new(2), "Q", Vec::new(), "a", Difficulty::Easy)
            .unwrap_err();
        assert_eq!(err, QuestionError::NoOptions(QuestionId::new(2)));
    }

    #[test]
    fn correctness_is_case_sensitive() {
        let q = question(1);
        assert!(q.is_correct("SELECT"));
        assert!(!q.is_correct("select"));
        assert!(!q.is_correct("SELECT "));
    }

    #[test]
    fn set_rejects_duplicates_and_empty_payloads() {
        assert_eq!(
            QuestionSet::new(vec![question(1), question(1)], 60).unwrap_err(),
            QuestionError::DuplicateId(QuestionId::new(1))
        );
        assert_eq!(
            QuestionSet::new(Vec::new(), 60).unwrap_err(),
            QuestionError::EmptySet
        );
        assert_eq!(
            QuestionSet::new(vec![question(1)], 0).unwrap_err(),
            QuestionError::ZeroTimeLimit
        );
    }

    #[test]
    fn difficulty_parses_common_labels() {
        assert_eq!("Hard".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert_eq!("beginner".parse::<Difficulty>().unwrap(), Difficulty::Easy);
        assert!("impossible".parse::<Difficulty>().is_err());
    }
}
