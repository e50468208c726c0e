//! HTTP client for the remote exam API: question sets and authoritative grading.

use async_trait::async_trait;
use exam_core::model::{QuestionSet, SkillId};
use reqwest::{Client, RequestBuilder};
use tracing::debug;

use crate::config::ExamApiConfig;
use crate::error::{ExamLoadError, GradingError};
use crate::exam::grading::{GradingClient, GradingRequest, RemoteGrade};
use crate::exam::source::{QuestionSetPayload, QuestionSource};

#[derive(Clone, Debug)]
pub struct HttpExamApi {
    client: Client,
    config: ExamApiConfig,
}

impl HttpExamApi {
    #[must_use]
    pub fn new(config: ExamApiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ExamApiConfig {
        &self.config
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl QuestionSource for HttpExamApi {
    async fn load_questions(&self, skill_id: SkillId) -> Result<QuestionSet, ExamLoadError> {
        let url = self.config.endpoint(&format!("skills/{skill_id}/questions"));
        debug!(%skill_id, %url, "loading questions");

        let response = self.authorize(self.client.get(url)).send().await?;
        if !response.status().is_success() {
            return Err(ExamLoadError::HttpStatus(response.status()));
        }

        let body = response.text().await?;
        let payload: QuestionSetPayload = serde_json::from_str(&body)
            .map_err(|err| ExamLoadError::Malformed(err.to_string()))?;
        payload.into_set()
    }
}

#[async_trait]
impl GradingClient for HttpExamApi {
    async fn submit_grading(&self, request: &GradingRequest) -> Result<RemoteGrade, GradingError> {
        let url = self
            .config
            .endpoint(&format!("skills/{}/grade", request.skill_id));

        let response = self
            .authorize(self.client.post(url))
            .json(request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GradingError::HttpStatus(response.status()));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|err| GradingError::Malformed(err.to_string()))
    }
}
