use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyticsError {
    #[error("Not enough data to perform calculation: {0}")]
    NotEnoughData(String),

    #[error("Strategy rules could not be built: {0}")]
    Rules(#[from] strategies::StrategyError),

    #[error("Invalid DNA: {0}")]
    InvalidDna(#[from] core_types::CoreError),
}
