use chrono::{DateTime, Utc};
use core_types::{FitnessTerms, Outcome, VolatilityRegime};
use serde::{Deserialize, Serialize};

/// One simulated bet, settled against the recorded result. Money amounts are
/// fractions of a unit bankroll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettledBet {
    pub match_id: String,
    pub kickoff: DateTime<Utc>,
    pub selection: Outcome,
    pub regime: VolatilityRegime,
    pub odds: f64,
    pub probability: f64,
    pub edge: f64,
    pub stake: f64,
    pub profit: f64,
    pub expected_profit: f64,
    /// Profit after slippage, fees and the liquidity cap.
    pub friction_profit: f64,
    pub friction_stake: f64,
    /// Time-decay weight in `[floor, 1]`.
    pub weight: f64,
    pub won: bool,
}

impl SettledBet {
    pub fn return_on_stake(&self) -> f64 {
        if self.stake > 0.0 { self.profit / self.stake } else { 0.0 }
    }
}

/// The clipped sub-terms that were combined into the final fitness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FitnessBreakdown {
    pub roi: f64,
    pub sharpe: f64,
    pub drawdown: f64,
    pub friction_roi: f64,
    pub expected_roi: f64,
    pub calibration: f64,
    pub volume: f64,
    pub complexity: f64,
}

/// Output of one evaluation: the aggregate terms plus the settled-bet ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub terms: FitnessTerms,
    pub breakdown: FitnessBreakdown,
    pub ledger: Vec<SettledBet>,
}

impl Evaluation {
    pub fn empty() -> Self {
        Self {
            terms: FitnessTerms::default(),
            breakdown: FitnessBreakdown::default(),
            ledger: Vec::new(),
        }
    }
}
