use crate::candidate::FitnessTerms;
use crate::enums::{Archetype, SearchMode, StrategyStatus};
use crate::error::CoreError;
use crate::genes::{Dna, MarketId};
use crate::stress::{StressResult, StressStage};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A settled tip attributed to a strategy, comparing what the model expected
/// with what actually happened.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TipOutcome {
    pub settled_at: DateTime<Utc>,
    pub stake: f64,
    /// `stake * (p * odds - 1)` at decision time.
    pub expected_return: f64,
    pub realized_return: f64,
}

/// Running tallies of a strategy under shadow evaluation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ShadowState {
    pub tips: u32,
    pub staked: f64,
    pub realized_profit: f64,
    pub expected_profit: f64,
}

impl ShadowState {
    pub fn record(&mut self, tip: &TipOutcome) {
        self.tips += 1;
        self.staked += tip.stake;
        self.realized_profit += tip.realized_return;
        self.expected_profit += tip.expected_return;
    }

    pub fn realized_roi(&self) -> f64 {
        if self.staked > 0.0 { self.realized_profit / self.staked } else { 0.0 }
    }

    pub fn expected_roi(&self) -> f64 {
        if self.staked > 0.0 { self.expected_profit / self.staked } else { 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveState {
    pub activated_at: DateTime<Utc>,
    pub activated_by: String,
    /// Most recent settled tips, oldest first, bounded by the drift window.
    pub recent_tips: Vec<TipOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedState {
    pub archived_at: DateTime<Utc>,
    pub reason: TransitionReason,
    /// No retraining for this market is permitted before this instant.
    pub cooldown_until: Option<DateTime<Utc>>,
}

/// Lifecycle of a strategy. Each state carries only the fields valid for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Lifecycle {
    Shadow(ShadowState),
    Active(ActiveState),
    Archived(ArchivedState),
}

impl Lifecycle {
    pub fn status(&self) -> StrategyStatus {
        match self {
            Lifecycle::Shadow(_) => StrategyStatus::Shadow,
            Lifecycle::Active(_) => StrategyStatus::Active,
            Lifecycle::Archived(_) => StrategyStatus::Archived,
        }
    }

    /// Validates a move to `to`. Archived is terminal; active never returns
    /// to shadow.
    pub fn check_transition(&self, to: StrategyStatus) -> Result<(), CoreError> {
        let allowed = matches!(
            (self.status(), to),
            (StrategyStatus::Shadow, StrategyStatus::Active)
                | (StrategyStatus::Shadow, StrategyStatus::Archived)
                | (StrategyStatus::Active, StrategyStatus::Archived)
        );
        if allowed {
            Ok(())
        } else {
            Err(CoreError::IllegalTransition {
                from: self.status().to_string(),
                to: to.to_string(),
            })
        }
    }
}

/// How a strategy was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationNotes {
    pub seed: u64,
    pub mode: SearchMode,
    pub training_window: (NaiveDate, NaiveDate),
    pub validation_window: (NaiveDate, NaiveDate),
    pub lookback_years: u32,
    pub decay_floor: f64,
    /// Mean pairwise normalized gene distance of the final population.
    pub population_diversity: f64,
    pub ensemble_runs: Option<usize>,
    pub robust_genes: Vec<String>,
    pub unstable_genes: Vec<String>,
    /// The search candidate this strategy was mined from. Stress seeds are
    /// derived from it.
    #[serde(default)]
    pub candidate_id: Option<Uuid>,
}

/// The persisted, addressable unit of the strategy history. Everything except
/// `lifecycle` and `version` is immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: Uuid,
    pub market: MarketId,
    pub dna: Dna,
    pub generation: usize,
    pub training: FitnessTerms,
    pub validation: FitnessTerms,
    pub stress: Option<StressResult>,
    pub archetype: Option<Archetype>,
    pub notes: OptimizationNotes,
    pub created_at: DateTime<Utc>,
    pub lifecycle: Lifecycle,
    /// Optimistic-concurrency version, bumped on every lifecycle write.
    pub version: i64,
}

impl Strategy {
    pub fn status(&self) -> StrategyStatus {
        self.lifecycle.status()
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// Only a finalist-stage pass counts; a prefilter pass is provisional.
    pub fn stress_passed(&self) -> bool {
        self.stress
            .as_ref()
            .is_some_and(|s| s.passed && s.stage == StressStage::Finalist)
    }

    /// The identity stress runs are seeded from: the mined candidate when
    /// known, otherwise the strategy itself.
    pub fn stress_identity(&self) -> Uuid {
        self.notes.candidate_id.unwrap_or(self.id)
    }
}

/// Why a lifecycle transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    GatedPromotion,
    ManualActivation,
    Superseded,
    DriftRollback,
    ManualArchive,
}

/// Audit record written with every lifecycle transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionAudit {
    pub id: Uuid,
    pub strategy_id: Uuid,
    pub market: MarketId,
    pub from: StrategyStatus,
    pub to: StrategyStatus,
    pub actor: String,
    pub reason: TransitionReason,
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// An emergency market-wide suppression window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOverride {
    pub id: Uuid,
    pub market: MarketId,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub reason: String,
    pub actor: String,
}

impl MarketOverride {
    pub fn is_active(&self, at: DateTime<Utc>) -> bool {
        at >= self.starts_at && at < self.ends_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archived_is_terminal() {
        let archived = Lifecycle::Archived(ArchivedState {
            archived_at: Utc::now(),
            reason: TransitionReason::ManualArchive,
            cooldown_until: None,
        });
        assert!(archived.check_transition(StrategyStatus::Active).is_err());
        assert!(
            Lifecycle::Shadow(ShadowState::default())
                .check_transition(StrategyStatus::Active)
                .is_ok()
        );
    }

    #[test]
    fn shadow_state_tracks_roi() {
        let mut shadow = ShadowState::default();
        shadow.record(&TipOutcome {
            settled_at: Utc::now(),
            stake: 2.0,
            expected_return: 0.2,
            realized_return: -2.0,
        });
        shadow.record(&TipOutcome {
            settled_at: Utc::now(),
            stake: 2.0,
            expected_return: 0.2,
            realized_return: 2.4,
        });
        assert_eq!(shadow.tips, 2);
        assert!((shadow.realized_roi() - 0.1).abs() < 1e-12);
        assert!((shadow.expected_roi() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn lifecycle_serializes_with_status_tag() {
        let json = serde_json::to_value(Lifecycle::Shadow(ShadowState::default())).unwrap();
        assert_eq!(json["status"], "shadow");
    }
}
