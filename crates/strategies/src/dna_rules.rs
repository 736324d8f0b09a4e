use crate::error::StrategyError;
use crate::{BetDecision, BetRule, BetSelection, PassReason};
use core_types::{Dna, GeneVector, MatchRecord, Outcome, OutcomeTriple, VolatilityRegime};

/// Gene values of one regime variant, pulled out of the vector once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleParams {
    pub min_edge: f64,
    pub min_odds: f64,
    pub max_odds: f64,
    pub kelly_fraction: f64,
    pub max_stake: f64,
    pub min_confidence: f64,
    pub draw_penalty: f64,
    pub xg_weight: f64,
}

impl RuleParams {
    pub fn from_vector(vector: &GeneVector) -> Result<Self, StrategyError> {
        let params = Self {
            min_edge: vector.require("min_edge")?,
            min_odds: vector.require("min_odds")?,
            max_odds: vector.require("max_odds")?,
            kelly_fraction: vector.require("kelly_fraction")?,
            max_stake: vector.require("max_stake")?,
            min_confidence: vector.require("min_confidence")?,
            draw_penalty: vector.require("draw_penalty")?,
            xg_weight: vector.require("xg_weight")?,
        };
        if params.min_odds > params.max_odds {
            return Err(StrategyError::InvalidParameters(format!(
                "min_odds {} exceeds max_odds {}",
                params.min_odds, params.max_odds
            )));
        }
        Ok(params)
    }
}

/// Bet rules driven by a two-regime DNA.
#[derive(Debug, Clone, PartialEq)]
pub struct DnaRules {
    low: RuleParams,
    high: RuleParams,
    regime_split: f64,
}

impl DnaRules {
    pub fn new(dna: &Dna, regime_split: f64) -> Result<Self, StrategyError> {
        Ok(Self {
            low: RuleParams::from_vector(&dna.low_vol)?,
            high: RuleParams::from_vector(&dna.high_vol)?,
            regime_split,
        })
    }

    pub fn params(&self, regime: VolatilityRegime) -> &RuleParams {
        match regime {
            VolatilityRegime::Low => &self.low,
            VolatilityRegime::High => &self.high,
        }
    }
}

/// Evenly priced matches (small implied-probability spread) are the volatile
/// ones.
pub fn regime_of(record: &MatchRecord, regime_split: f64) -> VolatilityRegime {
    if record.implied_spread() < regime_split {
        VolatilityRegime::High
    } else {
        VolatilityRegime::Low
    }
}

/// Shifts home/away probability toward the side with the larger xG share,
/// then renormalizes.
pub fn tilted_probabilities(record: &MatchRecord, xg_weight: f64) -> Option<OutcomeTriple> {
    let total_xg = record.xg_home + record.xg_away;
    let tilt = if total_xg > 0.0 {
        xg_weight * (record.xg_home / total_xg - 0.5)
    } else {
        0.0
    };
    let p = record.model_probs;
    OutcomeTriple::new(
        (p.home * (1.0 + tilt)).max(0.0),
        p.draw,
        (p.away * (1.0 - tilt)).max(0.0),
    )
    .normalized()
}

impl BetRule for DnaRules {
    fn evaluate(&self, record: &MatchRecord) -> BetDecision {
        let regime = regime_of(record, self.regime_split);
        let params = self.params(regime);

        if record.confidence < params.min_confidence {
            return BetDecision::Pass(PassReason::BelowConfidence);
        }
        let Some(probs) = tilted_probabilities(record, params.xg_weight) else {
            return BetDecision::Pass(PassReason::NoEdge);
        };

        let mut best: Option<BetSelection> = None;
        for outcome in Outcome::ALL {
            let odds = record.odds.get(outcome);
            if odds < params.min_odds || odds > params.max_odds || odds <= 1.0 {
                continue;
            }
            let probability = probs.get(outcome);
            let mut edge = probability * odds - 1.0;
            if outcome == Outcome::Draw {
                edge -= params.draw_penalty;
            }
            if edge < params.min_edge || edge <= 0.0 {
                continue;
            }
            if best.as_ref().is_some_and(|b| b.edge >= edge) {
                continue;
            }
            let kelly = edge / (odds - 1.0);
            let stake_fraction = (params.kelly_fraction * kelly).min(params.max_stake);
            best = Some(BetSelection {
                selection: outcome,
                odds,
                probability,
                edge,
                stake_fraction,
                regime,
            });
        }

        match best {
            Some(selection) if selection.stake_fraction > 0.0 => BetDecision::Bet(selection),
            _ => BetDecision::Pass(PassReason::NoEdge),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use core_types::{GeneRanges, MarketId};

    fn record(odds: OutcomeTriple, probs: OutcomeTriple) -> MatchRecord {
        MatchRecord {
            match_id: "m1".to_string(),
            market: MarketId::new("EPL"),
            kickoff: Utc.with_ymd_and_hms(2024, 3, 2, 15, 0, 0).unwrap(),
            odds,
            model_probs: probs,
            xg_home: 1.2,
            xg_away: 1.2,
            confidence: 0.8,
            data_quality: 0.9,
            liquidity: None,
            market_drift: None,
            sentiment_available: true,
            result: None,
        }
    }

    fn dna(edit: impl Fn(&mut GeneVector)) -> Dna {
        let mut vector = GeneRanges::betting_defaults().midpoint_vector();
        vector.set("min_edge", 0.02);
        vector.set("min_odds", 1.5);
        vector.set("max_odds", 6.0);
        vector.set("kelly_fraction", 0.25);
        vector.set("max_stake", 0.03);
        vector.set("min_confidence", 0.5);
        vector.set("draw_penalty", 0.0);
        vector.set("xg_weight", 0.0);
        edit(&mut vector);
        Dna::uniform(vector)
    }

    #[test]
    fn picks_the_largest_edge_inside_odds_bounds() {
        let rules = DnaRules::new(&dna(|_| {}), 0.3).unwrap();
        let rec = record(
            OutcomeTriple::new(2.2, 3.4, 3.6),
            OutcomeTriple::new(0.50, 0.25, 0.25),
        );
        let BetDecision::Bet(bet) = rules.evaluate(&rec) else {
            panic!("expected a bet");
        };
        assert_eq!(bet.selection, Outcome::Home);
        assert!((bet.edge - 0.10).abs() < 1e-9);
        // 0.25 * 0.10 / 1.2
        assert!((bet.stake_fraction - 0.25 * 0.10 / 1.2).abs() < 1e-9);
    }

    #[test]
    fn stake_is_capped_and_draw_penalized() {
        let rules = DnaRules::new(
            &dna(|v| {
                v.set("kelly_fraction", 0.5);
                v.set("max_stake", 0.01);
                v.set("draw_penalty", 0.5);
            }),
            0.3,
        )
        .unwrap();
        let rec = record(
            OutcomeTriple::new(3.0, 4.0, 3.0),
            OutcomeTriple::new(0.30, 0.40, 0.30),
        );
        // Home and away carry negative edge; the draw keeps 0.6 - 0.5.
        let BetDecision::Bet(bet) = rules.evaluate(&rec) else {
            panic!("expected a bet");
        };
        assert_eq!(bet.selection, Outcome::Draw);
        assert!((bet.edge - 0.1).abs() < 1e-9);
        assert_eq!(bet.stake_fraction, 0.01);
    }

    #[test]
    fn yields_when_confidence_is_low_or_no_edge() {
        let rules = DnaRules::new(&dna(|_| {}), 0.3).unwrap();
        let mut rec = record(
            OutcomeTriple::new(2.0, 3.0, 4.0),
            OutcomeTriple::new(0.45, 0.30, 0.25),
        );
        assert_eq!(rules.evaluate(&rec), BetDecision::Pass(PassReason::NoEdge));
        rec.confidence = 0.1;
        assert_eq!(rules.evaluate(&rec), BetDecision::Pass(PassReason::BelowConfidence));
    }

    #[test]
    fn xg_tilt_moves_probability_toward_the_stronger_side() {
        let mut rec = record(
            OutcomeTriple::new(2.5, 3.2, 2.9),
            OutcomeTriple::new(0.4, 0.3, 0.3),
        );
        rec.xg_home = 3.0;
        rec.xg_away = 1.0;
        let tilted = tilted_probabilities(&rec, 1.0).unwrap();
        assert!(tilted.home > 0.4);
        assert!(tilted.away < 0.3);
        assert!((tilted.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn regime_follows_the_implied_spread() {
        let even = record(OutcomeTriple::new(2.9, 3.1, 2.9), OutcomeTriple::new(0.34, 0.32, 0.34));
        let lopsided = record(OutcomeTriple::new(1.3, 5.5, 9.0), OutcomeTriple::new(0.7, 0.2, 0.1));
        assert_eq!(regime_of(&even, 0.3), VolatilityRegime::High);
        assert_eq!(regime_of(&lopsided, 0.3), VolatilityRegime::Low);
    }

    #[test]
    fn rejects_inverted_odds_bounds() {
        let bad = dna(|v| {
            v.set("min_odds", 5.0);
            v.set("max_odds", 3.0);
        });
        assert!(matches!(
            DnaRules::new(&bad, 0.3),
            Err(StrategyError::InvalidParameters(_))
        ));
    }
}
