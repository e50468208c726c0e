use std::collections::HashMap;

use async_trait::async_trait;
use exam_core::model::{Difficulty, Question, QuestionId, QuestionSet, SkillId};
use serde::Deserialize;

use crate::error::ExamLoadError;

/// Where question sets come from.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// # Errors
    ///
    /// Returns `ExamLoadError` when the set cannot be fetched or is invalid.
    async fn load_questions(&self, skill_id: SkillId) -> Result<QuestionSet, ExamLoadError>;
}

/// Wire shape of a question set, as served by the exam API.
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionSetPayload {
    pub questions: Vec<QuestionPayload>,
    #[serde(alias = "timeLimitSeconds", alias = "time_limit_seconds")]
    pub time_limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionPayload {
    pub id: u64,
    #[serde(alias = "text")]
    pub question: String,
    pub options: Vec<String>,
    #[serde(alias = "correctAnswer")]
    pub correct_answer: String,
    #[serde(default)]
    pub difficulty: Option<String>,
}

impl QuestionSetPayload {
    /// # Errors
    ///
    /// Returns `ExamLoadError::Questions` if the payload violates question rules.
    pub fn into_set(self) -> Result<QuestionSet, ExamLoadError> {
        let questions = self
            .questions
            .into_iter()
            .map(|q| {
                let difficulty = match q.difficulty.as_deref() {
                    Some(raw) => raw.parse::<Difficulty>()?,
                    None => Difficulty::default(),
                };
                Question::new(
                    QuestionId::new(q.id),
                    q.question,
                    q.options,
                    q.correct_answer,
                    difficulty,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(QuestionSet::new(questions, self.time_limit)?)
    }
}

/// Question sets held in memory, keyed by skill.
#[derive(Debug, Clone, Default)]
pub struct StaticQuestionSource {
    sets: HashMap<SkillId, QuestionSet>,
}

impl StaticQuestionSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_set(mut self, skill_id: SkillId, set: QuestionSet) -> Self {
        self.sets.insert(skill_id, set);
        self
    }

    /// Parse a JSON object mapping skill ids to question-set payloads.
    ///
    /// # Errors
    ///
    /// Returns `ExamLoadError` for malformed JSON, bad skill ids, or invalid sets.
    pub fn from_json(raw: &str) -> Result<Self, ExamLoadError> {
        let payloads: HashMap<String, QuestionSetPayload> =
            serde_json::from_str(raw).map_err(|err| ExamLoadError::Malformed(err.to_string()))?;
        let mut source = Self::new();
        for (key, payload) in payloads {
            let skill_id = key
                .parse::<SkillId>()
                .map_err(|err| ExamLoadError::Malformed(err.to_string()))?;
            source.sets.insert(skill_id, payload.into_set()?);
        }
        Ok(source)
    }
}

#[async_trait]
impl QuestionSource for StaticQuestionSource {
    async fn load_questions(&self, skill_id: SkillId) -> Result<QuestionSet, ExamLoadError> {
        self.sets
            .get(&skill_id)
            .cloned()
            .ok_or(ExamLoadError::UnknownSkill(skill_id))
    }
}
