use crate::enums::Outcome;
use crate::genes::MarketId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One value per 1X2 outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeTriple {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl OutcomeTriple {
    pub fn new(home: f64, draw: f64, away: f64) -> Self {
        Self { home, draw, away }
    }

    pub fn get(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    pub fn sum(&self) -> f64 {
        self.home + self.draw + self.away
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self::new(f(self.home), f(self.draw), f(self.away))
    }

    /// Scales the triple so it sums to one. Returns `None` when the sum is not
    /// a positive finite number.
    pub fn normalized(&self) -> Option<Self> {
        let sum = self.sum();
        if !sum.is_finite() || sum <= 0.0 {
            return None;
        }
        Some(self.map(|p| p / sum))
    }
}

/// A normalized match/odds/result record. Historical records carry a
/// `result`; live contexts leave it empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: String,
    pub market: MarketId,
    pub kickoff: DateTime<Utc>,
    /// Decimal odds offered per outcome.
    pub odds: OutcomeTriple,
    /// The model's own probability estimate per outcome.
    pub model_probs: OutcomeTriple,
    pub xg_home: f64,
    pub xg_away: f64,
    /// Model confidence in `[0, 1]`.
    pub confidence: f64,
    /// Upstream data-quality score in `[0, 1]`.
    pub data_quality: f64,
    /// Largest stake (as bankroll fraction) the market absorbs without moving.
    pub liquidity: Option<f64>,
    /// Drift reported by the market-inference service, if it answered.
    pub market_drift: Option<f64>,
    pub sentiment_available: bool,
    pub result: Option<Outcome>,
}

impl MatchRecord {
    /// Spread between the most and least likely implied outcome; used to pick
    /// the volatility regime.
    pub fn implied_spread(&self) -> f64 {
        let implied = self.odds.map(|o| if o > 0.0 { 1.0 / o } else { 0.0 });
        let Some(p) = implied.normalized() else {
            return 0.0;
        };
        let max = p.home.max(p.draw).max(p.away);
        let min = p.home.min(p.draw).min(p.away);
        max - min
    }

    pub fn is_settled(&self) -> bool {
        self.result.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_rejects_degenerate_sums() {
        assert!(OutcomeTriple::new(0.0, 0.0, 0.0).normalized().is_none());
        let n = OutcomeTriple::new(2.0, 1.0, 1.0).normalized().unwrap();
        assert!((n.sum() - 1.0).abs() < 1e-12);
        assert_eq!(n.home, 0.5);
    }
}
