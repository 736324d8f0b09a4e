use thiserror::Error;

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("Store error occurred during backtest: {0}")]
    Store(#[from] database::StoreError),

    #[error("Outcome history could not be fetched: {0}")]
    Source(#[from] database::SourceError),

    #[error("Policy error: {0}")]
    Policy(#[from] configuration::ConfigError),

    #[error("Backtest window is empty or inverted: {0}")]
    InvalidWindow(String),

    #[error("Value {0} cannot be represented as a bankroll amount")]
    Decimal(f64),

    #[error("Progress bar template error: {0}")]
    ProgressBarTemplate(String),

    #[error("Historical data for the requested range is incomplete or missing.")]
    DataUnavailable,
}

impl From<indicatif::style::TemplateError> for BacktestError {
    fn from(error: indicatif::style::TemplateError) -> Self {
        BacktestError::ProgressBarTemplate(error.to_string())
    }
}
