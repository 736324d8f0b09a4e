use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Policy error: {0}")]
    Policy(#[from] configuration::ConfigError),

    #[error("Database error: {0}")]
    Store(#[from] database::StoreError),

    #[error("External source error: {0}")]
    Source(#[from] database::SourceError),

    #[error("Promotion error: {0}")]
    Promotion(#[from] promotion::PromotionError),

    #[error("Match {match_id} belongs to market {actual}, not {expected}")]
    WrongMarket {
        match_id: String,
        expected: String,
        actual: String,
    },

    #[error("Workload pool closed")]
    PoolClosed(#[from] tokio::sync::AcquireError),
}
