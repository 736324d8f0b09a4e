use chrono::{DateTime, Utc};
use core_types::MarketId;
use indicatif::style::TemplateError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnsembleError {
    #[error("Candidate search failed: {0}")]
    Search(#[from] arena::ArenaError),

    #[error("Failed to score the consensus DNA: {0}")]
    Analytics(#[from] analytics::AnalyticsError),

    #[error("Invalid DNA: {0}")]
    Core(#[from] core_types::CoreError),

    #[error("Market {market} is cooling down after a rollback until {until}")]
    Cooldown {
        market: MarketId,
        until: DateTime<Utc>,
    },

    #[error("An ensemble needs at least two runs, got {0}")]
    TooFewRuns(usize),

    #[error("Progress bar template error: {0}")]
    ProgressBarTemplate(String),
}

impl From<TemplateError> for EnsembleError {
    fn from(error: TemplateError) -> Self {
        EnsembleError::ProgressBarTemplate(error.to_string())
    }
}
