use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Store error: {0}")]
    Store(#[from] database::StoreError),

    #[error("No strategies found for {0}")]
    NoStrategiesFound(String),
}
