#![forbid(unsafe_code)]

pub mod api;
pub mod app_services;
pub mod batch_service;
pub mod config;
pub mod error;
pub mod exam;

pub use exam_core::Clock;

pub use api::HttpExamApi;
pub use app_services::AppServices;
pub use batch_service::AssessmentBatchService;
pub use config::{ExamApiConfig, policy_from_env};
pub use error::{
    AppServicesError, BatchError, ConfigError, ExamError, ExamLoadError, FullscreenError,
    GradingError, HostError, SubmitError,
};
