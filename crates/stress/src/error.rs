use thiserror::Error;

#[derive(Error, Debug)]
pub enum StressError {
    #[error("Failed to simulate the candidate ledger: {0}")]
    Analytics(#[from] analytics::AnalyticsError),

    #[error("Failed to build the worker pool: {0}")]
    ThreadPool(String),
}
