use indicatif::style::TemplateError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimeMachineError {
    #[error("Snapshot store error: {0}")]
    Store(#[from] database::StoreError),

    #[error("Failed to fetch outcome history: {0}")]
    Source(#[from] database::SourceError),

    #[error("Date range or anchor error: {0}")]
    DateError(String),

    #[error("No markets to process")]
    NoMarkets,

    #[error("Failed to build the worker pool: {0}")]
    ThreadPool(String),

    #[error("Worker task failed: {0}")]
    Join(String),

    #[error("Progress bar template error: {0}")]
    ProgressBarTemplate(String),
}

impl From<TemplateError> for TimeMachineError {
    fn from(error: TemplateError) -> Self {
        TimeMachineError::ProgressBarTemplate(error.to_string())
    }
}
