use crate::calibration::{CalibrationSample, expected_calibration_error};
use crate::complexity::{PopulationContext, complexity_penalty};
use crate::error::AnalyticsError;
use crate::report::{Evaluation, FitnessBreakdown, SettledBet};
use crate::stats::{clip, max_drawdown, weighted_mean_std};
use chrono::{DateTime, Utc};
use configuration::FitnessConfig;
use core_types::{Dna, FitnessTerms, GeneRanges, MatchRecord};
use strategies::{BetDecision, BetRule, DnaRules};

/// `max(floor, 1 - age_fraction)`.
pub fn decay_weight(age_fraction: f64, floor: f64) -> f64 {
    (1.0 - age_fraction.clamp(0.0, 1.0)).max(floor)
}

/// Scores DNA against a historical window. A pure function of its inputs:
/// the same DNA, records and constants always produce the same evaluation.
#[derive(Debug, Clone)]
pub struct FitnessEvaluator {
    config: FitnessConfig,
    regime_split: f64,
}

impl FitnessEvaluator {
    pub fn new(config: FitnessConfig, regime_split: f64) -> Self {
        Self {
            config,
            regime_split,
        }
    }

    pub fn config(&self) -> &FitnessConfig {
        &self.config
    }

    pub fn regime_split(&self) -> f64 {
        self.regime_split
    }

    /// Simulates the DNA over the settled records and returns the ledger in
    /// kickoff order.
    pub fn simulate(
        &self,
        dna: &Dna,
        records: &[MatchRecord],
    ) -> Result<Vec<SettledBet>, AnalyticsError> {
        let rules = DnaRules::new(dna, self.regime_split)?;

        let mut settled: Vec<&MatchRecord> = records.iter().filter(|r| r.is_settled()).collect();
        settled.sort_by_key(|r| r.kickoff);
        let (Some(start), Some(end)) = (
            settled.first().map(|r| r.kickoff),
            settled.last().map(|r| r.kickoff),
        ) else {
            return Ok(Vec::new());
        };
        let span = (end - start).num_seconds().max(0) as f64;
        let age_fraction = |kickoff: DateTime<Utc>| {
            if span > 0.0 {
                (end - kickoff).num_seconds() as f64 / span
            } else {
                0.0
            }
        };

        let cfg = &self.config;
        let mut ledger = Vec::new();
        for record in settled {
            let (BetDecision::Bet(bet), Some(result)) = (rules.evaluate(record), record.result)
            else {
                continue;
            };
            let won = result == bet.selection;

            let liquidity = record.liquidity.unwrap_or(cfg.liquidity_ceiling);
            let friction_stake = bet
                .stake_fraction
                .min(cfg.liquidity_ceiling)
                .min(liquidity)
                .max(0.0);
            let effective_odds = (bet.odds * (1.0 - cfg.slippage)).max(1.0);
            let gross = if won {
                friction_stake * (effective_odds - 1.0)
            } else {
                -friction_stake
            };

            ledger.push(SettledBet {
                match_id: record.match_id.clone(),
                kickoff: record.kickoff,
                selection: bet.selection,
                regime: bet.regime,
                odds: bet.odds,
                probability: bet.probability,
                edge: bet.edge,
                stake: bet.stake_fraction,
                profit: bet.settle(result),
                expected_profit: bet.stake_fraction * (bet.probability * bet.odds - 1.0),
                friction_profit: gross - cfg.fee * friction_stake,
                friction_stake,
                weight: decay_weight(age_fraction(record.kickoff), cfg.decay_floor),
                won,
            });
        }
        Ok(ledger)
    }

    /// Full evaluation: simulation, aggregation and the weighted fitness.
    pub fn evaluate(
        &self,
        dna: &Dna,
        ranges: &GeneRanges,
        records: &[MatchRecord],
        context: Option<&PopulationContext>,
    ) -> Result<Evaluation, AnalyticsError> {
        let ledger = self.simulate(dna, records)?;
        let penalty = complexity_penalty(dna, ranges, context).total();
        Ok(self.score(ledger, penalty))
    }

    /// Aggregates a ledger into fitness terms.
    pub fn score(&self, ledger: Vec<SettledBet>, complexity: f64) -> Evaluation {
        let cfg = &self.config;
        let w = &cfg.weights;

        let weighted_stake: f64 = ledger.iter().map(|b| b.weight * b.stake).sum();
        let weighted_friction_stake: f64 = ledger.iter().map(|b| b.weight * b.friction_stake).sum();
        let weighted_bets: f64 = ledger.iter().map(|b| b.weight).sum();

        let ratio = |num: f64, den: f64| if den > 0.0 { num / den } else { 0.0 };
        let roi = ratio(
            ledger.iter().map(|b| b.weight * b.profit).sum(),
            weighted_stake,
        );
        let friction_roi = ratio(
            ledger.iter().map(|b| b.weight * b.friction_profit).sum(),
            weighted_friction_stake,
        );
        let expected_roi = ratio(
            ledger.iter().map(|b| b.weight * b.expected_profit).sum(),
            weighted_stake,
        );

        let returns: Vec<(f64, f64)> = ledger
            .iter()
            .map(|b| (b.return_on_stake(), b.weight))
            .collect();
        let (mean_return, std_return) = weighted_mean_std(&returns);
        let sharpe = if std_return > 0.0 { mean_return / std_return } else { 0.0 };

        let mut equity = Vec::with_capacity(ledger.len() + 1);
        equity.push(1.0);
        let mut bankroll = 1.0;
        for bet in &ledger {
            bankroll += bet.profit;
            equity.push(bankroll);
        }
        let drawdown = max_drawdown(&equity);

        let samples: Vec<CalibrationSample> = ledger
            .iter()
            .map(|b| CalibrationSample {
                confidence: b.probability,
                hit: b.won,
                weight: b.weight,
            })
            .collect();
        let ece = expected_calibration_error(&samples, cfg.ece_buckets, cfg.ece_min_bucket_n)
            .map(|r| r.ece)
            .unwrap_or(0.0);

        let volume = if cfg.min_bets_target > 0.0 {
            clip(weighted_bets / cfg.min_bets_target, 0.0, 1.0)
        } else {
            1.0
        };
        // Thin samples keep their losses but only part of their gains.
        let soft = |term: f64| if term > 0.0 { term * volume } else { term };
        let scaled = |value: f64, scale: f64| if scale > 0.0 { value / scale } else { 0.0 };

        let breakdown = FitnessBreakdown {
            roi: soft(clip(scaled(roi, cfg.roi_scale), -1.0, 1.0)),
            sharpe: soft(clip(scaled(sharpe, cfg.sharpe_scale), -1.0, 1.0)),
            drawdown: clip(scaled(drawdown, cfg.drawdown_scale), 0.0, 1.0),
            friction_roi: soft(clip(scaled(friction_roi, cfg.roi_scale), -1.0, 1.0)),
            expected_roi: soft(clip(scaled(expected_roi, cfg.roi_scale), -1.0, 1.0)),
            calibration: clip(ece, 0.0, 1.0),
            volume,
            complexity: clip(complexity, 0.0, 1.0),
        };

        let fitness = w.roi * breakdown.roi + w.sharpe * breakdown.sharpe
            - w.drawdown * breakdown.drawdown
            + w.friction_roi * breakdown.friction_roi
            + w.expected_roi * breakdown.expected_roi
            - w.calibration * breakdown.calibration
            + w.volume * breakdown.volume
            - w.complexity * breakdown.complexity;

        let terms = FitnessTerms {
            roi,
            sharpe,
            max_drawdown: drawdown,
            bet_count: ledger.len(),
            weighted_bets,
            friction_roi,
            expected_roi,
            ece,
            complexity_penalty: breakdown.complexity,
            fitness,
        };

        Evaluation {
            terms,
            breakdown,
            ledger,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use core_types::fixtures::synthetic_history;
    use core_types::{GeneVector, MarketId, Outcome, OutcomeTriple};

    fn rules_vector() -> GeneVector {
        let mut v = GeneRanges::betting_defaults().midpoint_vector();
        v.set("min_edge", 0.01);
        v.set("min_odds", 1.5);
        v.set("max_odds", 6.0);
        v.set("kelly_fraction", 0.2);
        v.set("max_stake", 0.02);
        v.set("min_confidence", 0.3);
        v.set("draw_penalty", 0.0);
        v.set("xg_weight", 0.0);
        v
    }

    fn home_value_record(i: i64, result: Outcome) -> MatchRecord {
        MatchRecord {
            match_id: format!("m{i}"),
            market: MarketId::new("EPL"),
            kickoff: Utc.with_ymd_and_hms(2024, 1, 1, 15, 0, 0).unwrap() + Duration::days(i),
            odds: OutcomeTriple::new(2.0, 3.5, 4.0),
            model_probs: OutcomeTriple::new(0.6, 0.2, 0.2),
            xg_home: 1.5,
            xg_away: 1.0,
            confidence: 0.7,
            data_quality: 0.9,
            liquidity: None,
            market_drift: None,
            sentiment_available: true,
            result: Some(result),
        }
    }

    #[test]
    fn decay_weight_respects_the_floor() {
        assert_eq!(decay_weight(0.0, 0.2), 1.0);
        assert_eq!(decay_weight(1.0, 0.2), 0.2);
        assert!((decay_weight(0.5, 0.2) - 0.5).abs() < 1e-12);
        assert_eq!(decay_weight(0.95, 0.2), 0.2);
    }

    #[test]
    fn ledger_and_roi_follow_the_results() {
        let evaluator = FitnessEvaluator::new(FitnessConfig::default(), 0.3);
        let dna = Dna::uniform(rules_vector());
        let records = vec![
            home_value_record(0, Outcome::Home),
            home_value_record(1, Outcome::Away),
            home_value_record(2, Outcome::Home),
        ];
        let eval = evaluator
            .evaluate(&dna, &GeneRanges::betting_defaults(), &records, None)
            .unwrap();

        assert_eq!(eval.ledger.len(), 3);
        // edge 0.2 at odds 2.0: kelly 0.2 * 0.2 = 0.04, capped at 0.02
        assert!(eval.ledger.iter().all(|b| (b.stake - 0.02).abs() < 1e-12));
        assert_eq!(eval.ledger[0].weight, 0.2);
        assert_eq!(eval.ledger[2].weight, 1.0);

        assert!((eval.ledger[1].weight - 0.5).abs() < 1e-12);

        // Weighted: (0.2*0.02 - 0.5*0.02 + 1.0*0.02) / (1.7*0.02)
        let expected_roi = (0.2 - 0.5 + 1.0) / 1.7;
        assert!((eval.terms.roi - expected_roi).abs() < 1e-9);
        assert!((eval.terms.expected_roi - 0.2).abs() < 1e-9);
        assert!(eval.terms.friction_roi < eval.terms.roi);
        assert_eq!(eval.terms.bet_count, 3);
        assert!(eval.terms.max_drawdown > 0.0);
    }

    #[test]
    fn few_bets_are_scored_lower_but_not_discarded() {
        let evaluator = FitnessEvaluator::new(FitnessConfig::default(), 0.3);
        let dna = Dna::uniform(rules_vector());
        let few: Vec<_> = (0..3).map(|i| home_value_record(i, Outcome::Home)).collect();
        let many: Vec<_> = (0..60).map(|i| home_value_record(i, Outcome::Home)).collect();
        let ranges = GeneRanges::betting_defaults();

        let thin = evaluator.evaluate(&dna, &ranges, &few, None).unwrap();
        let thick = evaluator.evaluate(&dna, &ranges, &many, None).unwrap();
        assert!(thin.terms.fitness.is_finite());
        assert!(thin.terms.fitness > 0.0);
        assert!(thin.terms.fitness < thick.terms.fitness);
    }

    #[test]
    fn evaluation_is_deterministic_and_bounded() {
        let evaluator = FitnessEvaluator::new(FitnessConfig::default(), 0.3);
        let market = MarketId::new("EPL");
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let records = synthetic_history(&market, start, 400, 24, 11);
        let ranges = GeneRanges::betting_defaults();
        let dna = Dna::uniform(ranges.midpoint_vector());

        let a = evaluator.evaluate(&dna, &ranges, &records, None).unwrap();
        let b = evaluator.evaluate(&dna, &ranges, &records, None).unwrap();
        assert_eq!(a, b);

        let br = a.breakdown;
        for term in [br.roi, br.sharpe, br.friction_roi, br.expected_roi] {
            assert!((-1.0..=1.0).contains(&term));
        }
        for term in [br.drawdown, br.calibration, br.volume, br.complexity] {
            assert!((0.0..=1.0).contains(&term));
        }
    }

    #[test]
    fn unsettled_records_are_ignored() {
        let evaluator = FitnessEvaluator::new(FitnessConfig::default(), 0.3);
        let mut record = home_value_record(0, Outcome::Home);
        record.result = None;
        let eval = evaluator
            .evaluate(
                &Dna::uniform(rules_vector()),
                &GeneRanges::betting_defaults(),
                &[record],
                None,
            )
            .unwrap();
        assert!(eval.ledger.is_empty());
        assert_eq!(eval.terms.roi, 0.0);
    }
}
