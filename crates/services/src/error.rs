//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::{QuestionError, ResultError, SessionError, SkillId};
use exam_core::policy::PolicyError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted while loading a question set for a new exam.
///
/// These are the only exam errors shown to the user, with a retry action.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExamLoadError {
    #[error("exam API is not configured")]
    Disabled,
    #[error("no skill selected for the exam")]
    MissingSkill,
    #[error("skill {0} is not pending in this assessment")]
    UnknownSkill(SkillId),
    #[error("question request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("malformed question payload: {0}")]
    Malformed(String),
    #[error(transparent)]
    Questions(#[from] QuestionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors from the remote grading call.
///
/// Never surfaced to the user: every variant folds into the local fallback.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GradingError {
    #[error("remote grading is not configured")]
    Disabled,
    #[error("grading request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("malformed grading response: {0}")]
    Malformed(String),
    #[error("grading timed out")]
    Timeout,
}

/// Errors from the exclusive presentation (full-screen) host.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FullscreenError {
    #[error("full-screen request denied: {0}")]
    Denied(String),
    #[error("full screen is not supported by this host")]
    Unsupported,
}

/// Errors from the event host while wiring listeners.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HostError {
    #[error("listener registration failed: {0}")]
    Registration(String),
}

/// Errors emitted by the submission coordinator.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SubmitError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Result(#[from] ResultError),
    #[error("grading result belongs to a replaced session")]
    StaleTicket,
}

/// Errors emitted while starting or driving an exam.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExamError {
    #[error(transparent)]
    Load(#[from] ExamLoadError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
}

/// Errors emitted by the assessment batch service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BatchError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors in environment configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid value for {name}: {raw}")]
    InvalidValue { name: &'static str, raw: String },
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
