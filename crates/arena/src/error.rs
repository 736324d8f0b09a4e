use indicatif::style::TemplateError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArenaError {
    #[error("Fitness evaluation failed: {0}")]
    Analytics(#[from] analytics::AnalyticsError),

    #[error("Invalid DNA: {0}")]
    Core(#[from] core_types::CoreError),

    #[error("Not enough history to search: {0}")]
    NotEnoughData(String),

    #[error("Failed to build the worker pool: {0}")]
    ThreadPool(String),

    #[error("Progress bar template error: {0}")]
    ProgressBarTemplate(String),
}

impl From<TemplateError> for ArenaError {
    fn from(error: TemplateError) -> Self {
        ArenaError::ProgressBarTemplate(error.to_string())
    }
}
