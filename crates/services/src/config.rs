use std::env;
use std::time::Duration;

use exam_core::policy::ProctoringPolicy;

use crate::error::ConfigError;

const DEFAULT_GRADING_TIMEOUT_SECS: u64 = 10;

/// Connection settings for the remote exam API.
#[derive(Clone, Debug)]
pub struct ExamApiConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub grading_timeout: Duration,
}

impl ExamApiConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: None,
            grading_timeout: Duration::from_secs(DEFAULT_GRADING_TIMEOUT_SECS),
        }
    }

    /// Read `EXAM_API_BASE_URL`, `EXAM_API_TOKEN` and `EXAM_GRADING_TIMEOUT_SECS`.
    ///
    /// Returns `Ok(None)` when no base URL is configured.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for an unparseable timeout.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(base_url) = non_empty_var("EXAM_API_BASE_URL") else {
            return Ok(None);
        };
        let grading_timeout = parse_var::<u64>("EXAM_GRADING_TIMEOUT_SECS")?
            .map_or(Duration::from_secs(DEFAULT_GRADING_TIMEOUT_SECS), Duration::from_secs);

        Ok(Some(Self {
            base_url,
            api_token: non_empty_var("EXAM_API_TOKEN"),
            grading_timeout,
        }))
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Apply `EXAM_VIOLATION_CEILING`, `EXAM_WARNING_SECS` and `EXAM_GRACE_SECS`
/// on top of the default policy.
///
/// # Errors
///
/// Returns `ConfigError` for unparseable values or a policy that fails validation.
pub fn policy_from_env() -> Result<ProctoringPolicy, ConfigError> {
    let mut policy = ProctoringPolicy::default();
    if let Some(ceiling) = parse_var::<u32>("EXAM_VIOLATION_CEILING")? {
        policy = policy.with_violation_ceiling(ceiling);
    }
    if let Some(secs) = parse_var::<u64>("EXAM_WARNING_SECS")? {
        policy = policy.with_warning_duration(Duration::from_secs(secs));
    }
    if let Some(secs) = parse_var::<u64>("EXAM_GRACE_SECS")? {
        policy = policy.with_grace_period(Duration::from_secs(secs));
    }
    Ok(policy.validate()?)
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    let Some(raw) = non_empty_var(name) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue { name, raw })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let config = ExamApiConfig::new("https://api.example.test/v1/");
        assert_eq!(
            config.endpoint("skills/4/questions"),
            "https://api.example.test/v1/skills/4/questions"
        );
    }

    #[test]
    fn default_timeout_is_ten_seconds() {
        let config = ExamApiConfig::new("http://localhost");
        assert_eq!(config.grading_timeout, Duration::from_secs(10));
        assert!(config.api_token.is_none());
    }
}
