use crate::gates::PromotionBlocker;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PromotionError {
    #[error("Store error: {0}")]
    Store(#[from] database::StoreError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] core_types::CoreError),

    #[error("Strategy {strategy_id} is not eligible for promotion: {}", format_blockers(.blockers))]
    Ineligible {
        strategy_id: Uuid,
        blockers: Vec<PromotionBlocker>,
    },

    #[error("Gave up on strategy {strategy_id} after {attempts} conflicting writes")]
    Contention { strategy_id: Uuid, attempts: u32 },

    #[error("Strategy {0} is not active")]
    NotActive(Uuid),
}

fn format_blockers(blockers: &[PromotionBlocker]) -> String {
    blockers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
