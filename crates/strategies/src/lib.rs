//! # Oddsmith Strategy Library
//!
//! Turns a strategy's DNA into concrete bets. The same rules run inside the
//! Fitness Evaluator, the backtest replay and the live decision gate, so a
//! given match and DNA always produce the same selection.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** This is a pure logic crate. It has no knowledge of
//!   databases or runtimes and depends only on `core-types`.
//! - **Rule Agnostic Callers:** Callers hold a `BetRule` and never inspect
//!   genes themselves.
//!
//! ## Public API
//!
//! - `BetRule`: The trait every rule set implements.
//! - `DnaRules`: The gene-driven rule set.
//! - `BetDecision`, `BetSelection`, `PassReason`: Rule outputs.

// Declare all the modules that constitute this crate.
pub mod dna_rules;
pub mod error;

// Re-export the key components to create a clean, public-facing API.
pub use dna_rules::{DnaRules, RuleParams, regime_of, tilted_probabilities};
pub use error::StrategyError;

use core_types::{MatchRecord, Outcome, VolatilityRegime};
use serde::{Deserialize, Serialize};

/// A chosen bet on one outcome of a match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetSelection {
    pub selection: Outcome,
    pub odds: f64,
    /// Model probability of the selection after xG tilt.
    pub probability: f64,
    pub edge: f64,
    /// Stake as a fraction of bankroll.
    pub stake_fraction: f64,
    pub regime: VolatilityRegime,
}

impl BetSelection {
    /// Profit per unit of bankroll once the result is known.
    pub fn settle(&self, result: Outcome) -> f64 {
        if result == self.selection {
            self.stake_fraction * (self.odds - 1.0)
        } else {
            -self.stake_fraction
        }
    }

    /// Model-expected profit per unit of bankroll.
    pub fn expected_profit(&self) -> f64 {
        self.stake_fraction * self.edge
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassReason {
    BelowConfidence,
    NoEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BetDecision {
    Bet(BetSelection),
    Pass(PassReason),
}

impl BetDecision {
    pub fn selection(&self) -> Option<&BetSelection> {
        match self {
            BetDecision::Bet(selection) => Some(selection),
            BetDecision::Pass(_) => None,
        }
    }
}

/// The core trait every rule set implements.
///
/// The `Send + Sync` bounds let one rule set be shared across the search's
/// worker threads.
pub trait BetRule: Send + Sync {
    /// Decides whether, and how much, to bet on one match.
    fn evaluate(&self, record: &MatchRecord) -> BetDecision;
}
