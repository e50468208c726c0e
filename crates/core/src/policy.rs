use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PolicyError {
    #[error("violation ceiling must be >= 1")]
    InvalidCeiling,

    #[error("warning duration must be > 0")]
    InvalidWarningDuration,
}

/// Proctoring knobs for one exam.
///
/// Defaults: ceiling 3, 5s warning overlay, 2s grace before a forced
/// submission, 1s before silently re-entering full screen, one silent attempt
/// per involuntary exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProctoringPolicy {
    violation_ceiling: u32,
    warning_duration: Duration,
    grace_period: Duration,
    fullscreen_retry_delay: Duration,
    max_fullscreen_retries: u32,
}

impl Default for ProctoringPolicy {
    fn default() -> Self {
        Self {
            violation_ceiling: 3,
            warning_duration: Duration::from_secs(5),
            grace_period: Duration::from_secs(2),
            fullscreen_retry_delay: Duration::from_secs(1),
            max_fullscreen_retries: 1,
        }
    }
}

impl ProctoringPolicy {
    #[must_use]
    pub fn with_violation_ceiling(mut self, ceiling: u32) -> Self {
        self.violation_ceiling = ceiling;
        self
    }

    #[must_use]
    pub fn with_warning_duration(mut self, duration: Duration) -> Self {
        self.warning_duration = duration;
        self
    }

    #[must_use]
    pub fn with_grace_period(mut self, duration: Duration) -> Self {
        self.grace_period = duration;
        self
    }

    #[must_use]
    pub fn with_fullscreen_retry_delay(mut self, duration: Duration) -> Self {
        self.fullscreen_retry_delay = duration;
        self
    }

    #[must_use]
    pub fn with_max_fullscreen_retries(mut self, retries: u32) -> Self {
        self.max_fullscreen_retries = retries;
        self
    }

    /// # Errors
    ///
    /// Returns `PolicyError` for a zero ceiling or a zero warning duration.
    pub fn validate(self) -> Result<Self, PolicyError> {
        if self.violation_ceiling == 0 {
            return Err(PolicyError::InvalidCeiling);
        }
        if self.warning_duration.is_zero() {
            return Err(PolicyError::InvalidWarningDuration);
        }
        Ok(self)
    }

    #[must_use]
    pub fn violation_ceiling(&self) -> u32 {
        self.violation_ceiling
    }

    #[must_use]
    pub fn warning_duration(&self) -> Duration {
        self.warning_duration
    }

    #[must_use]
    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    #[must_use]
    pub fn fullscreen_retry_delay(&self) -> Duration {
        self.fullscreen_retry_delay
    }

    #[must_use]
    pub fn max_fullscreen_retries(&self) -> u32 {
        self.max_fullscreen_retries
    }
}
