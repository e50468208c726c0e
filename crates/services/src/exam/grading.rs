//! Two-stage grading: an optional remote grader, then the local score as fallback.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use exam_core::model::{GradeSource, QuestionId, SkillId};
use exam_core::scoring::{LocalGrade, round_one_decimal};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::GradingError;

/// Payload sent to the remote grader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GradingRequest {
    pub skill_id: SkillId,
    pub answers: BTreeMap<QuestionId, String>,
    pub time_taken_secs: u32,
}

/// Per-skill result returned by the remote grader.
///
/// `total_questions` may be omitted, in which case the local count is used.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RemoteGrade {
    #[serde(alias = "correctAnswers")]
    pub correct_answers: u32,
    #[serde(default, alias = "totalQuestions")]
    pub total_questions: Option<u32>,
    #[serde(alias = "score")]
    pub percentage: f64,
}

#[async_trait]
pub trait GradingClient: Send + Sync {
    /// # Errors
    ///
    /// Returns `GradingError` for transport failures or unusable responses.
    async fn submit_grading(&self, request: &GradingRequest) -> Result<RemoteGrade, GradingError>;
}

/// Which grade a finished exam carries.
#[derive(Debug, Clone, PartialEq)]
pub enum GradingOutcome {
    Authoritative { remote: RemoteGrade, local: LocalGrade },
    Fallback { local: LocalGrade, cause: String },
}

impl GradingOutcome {
    #[must_use]
    pub fn score(&self) -> f64 {
        match self {
            GradingOutcome::Authoritative { remote, .. } => round_one_decimal(remote.percentage),
            GradingOutcome::Fallback { local, .. } => local.score,
        }
    }

    #[must_use]
    pub fn correct_answers(&self) -> u32 {
        match self {
            GradingOutcome::Authoritative { remote, .. } => remote.correct_answers,
            GradingOutcome::Fallback { local, .. } => local.correct,
        }
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        match self {
            GradingOutcome::Authoritative { remote, local } => {
                remote.total_questions.unwrap_or(local.total)
            }
            GradingOutcome::Fallback { local, .. } => local.total,
        }
    }

    #[must_use]
    pub fn source(&self) -> GradeSource {
        match self {
            GradingOutcome::Authoritative { .. } => GradeSource::Authoritative,
            GradingOutcome::Fallback { .. } => GradeSource::Fallback,
        }
    }
}

/// Pick the remote grade when it is well formed, else the local one.
#[must_use]
pub fn resolve(local: LocalGrade, remote: Result<RemoteGrade, GradingError>) -> GradingOutcome {
    match remote.and_then(|grade| check_remote(grade, &local)) {
        Ok(remote) => GradingOutcome::Authoritative { remote, local },
        Err(err) => GradingOutcome::Fallback {
            local,
            cause: err.to_string(),
        },
    }
}

fn check_remote(grade: RemoteGrade, local: &LocalGrade) -> Result<RemoteGrade, GradingError> {
    if !grade.percentage.is_finite() || !(0.0..=100.0).contains(&grade.percentage) {
        return Err(GradingError::Malformed(format!(
            "percentage {} out of range",
            grade.percentage
        )));
    }
    let total = grade.total_questions.unwrap_or(local.total);
    if total == 0 {
        return Err(GradingError::Malformed("zero questions graded".into()));
    }
    if grade.correct_answers > total {
        return Err(GradingError::Malformed(format!(
            "{} correct out of {total}",
            grade.correct_answers
        )));
    }
    Ok(grade)
}

/// Bounded remote grading with a guaranteed local result.
#[derive(Clone)]
pub struct GradingPipeline {
    client: Option<Arc<dyn GradingClient>>,
    timeout: Duration,
}

impl GradingPipeline {
    #[must_use]
    pub fn new(client: Arc<dyn GradingClient>, timeout: Duration) -> Self {
        Self {
            client: Some(client),
            timeout,
        }
    }

    /// Always grades locally.
    #[must_use]
    pub fn local_only() -> Self {
        Self {
            client: None,
            timeout: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.client.is_some()
    }

    /// Never fails: any remote problem becomes `GradingOutcome::Fallback`.
    pub async fn grade(&self, request: &GradingRequest, local: LocalGrade) -> GradingOutcome {
        let remote = match &self.client {
            None => Err(GradingError::Disabled),
            Some(client) => tokio::time::timeout(self.timeout, client.submit_grading(request))
                .await
                .unwrap_or(Err(GradingError::Timeout)),
        };

        let outcome = resolve(local, remote);
        if let GradingOutcome::Fallback { cause, .. } = &outcome {
            if self.client.is_some() {
                warn!(skill_id = %request.skill_id, cause = %cause, "remote grading failed, using local score");
            } else {
                debug!(skill_id = %request.skill_id, "grading locally");
            }
        }
        outcome
    }
}

impl std::fmt::Debug for GradingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GradingPipeline")
            .field("remote", &self.is_remote())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exam::test_harness::ScriptedGrader;

    fn local() -> LocalGrade {
        LocalGrade {
            correct: 3,
            total: 5,
            score: 60.0,
        }
    }

    fn request() -> GradingRequest {
        GradingRequest {
            skill_id: SkillId::new(7),
            answers: BTreeMap::new(),
            time_taken_secs: 42,
        }
    }

    #[test]
    fn remote_grade_wins_when_well_formed() {
        let remote = RemoteGrade {
            correct_answers: 4,
            total_questions: None,
            percentage: 80.0,
        };
        let outcome = resolve(local(), Ok(remote));
        assert_eq!(outcome.source(), GradeSource::Authoritative);
        assert!((outcome.score() - 80.0).abs() < f64::EPSILON);
        assert_eq!(outcome.correct_answers(), 4);
        assert_eq!(outcome.total_questions(), 5);
    }

    #[test]
    fn malformed_remote_grade_falls_back() {
        for remote in [
            RemoteGrade {
                correct_answers: 9,
                total_questions: Some(5),
                percentage: 50.0,
            },
            RemoteGrade {
                correct_answers: 1,
                total_questions: Some(5),
                percentage: f64::NAN,
            },
            RemoteGrade {
                correct_answers: 1,
                total_questions: Some(5),
                percentage: 140.0,
            },
        ] {
            let outcome = resolve(local(), Ok(remote));
            assert_eq!(outcome.source(), GradeSource::Fallback);
            assert!((outcome.score() - 60.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn remote_grade_accepts_camel_case() {
        let grade: RemoteGrade =
            serde_json::from_str(r#"{"correctAnswers":2,"totalQuestions":4,"percentage":50}"#)
                .unwrap();
        assert_eq!(grade.correct_answers, 2);
        assert_eq!(grade.total_questions, Some(4));
    }

    #[tokio::test]
    async fn failing_client_yields_local_score() {
        let grader = ScriptedGrader::unavailable();
        let pipeline = GradingPipeline::new(grader.clone(), Duration::from_secs(1));
        let outcome = pipeline.grade(&request(), local()).await;
        assert_eq!(outcome.source(), GradeSource::Fallback);
        assert_eq!(outcome.correct_answers(), 3);
        assert_eq!(grader.calls(), 1);
    }

    #[tokio::test]
    async fn local_only_pipeline_never_calls_out() {
        let outcome = GradingPipeline::local_only().grade(&request(), local()).await;
        assert!(matches!(outcome, GradingOutcome::Fallback { .. }));
    }

    struct Stalled;

    #[async_trait]
    impl GradingClient for Stalled {
        async fn submit_grading(&self, _request: &GradingRequest) -> Result<RemoteGrade, GradingError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_grader_times_out() {
        let pipeline = GradingPipeline::new(Arc::new(Stalled), Duration::from_secs(10));
        let outcome = pipeline.grade(&request(), local()).await;
        match outcome {
            GradingOutcome::Fallback { cause, .. } => assert_eq!(cause, "grading timed out"),
            other => panic!("expected fallback, got {other:?}"),
        }
    }
}
