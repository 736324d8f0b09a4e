//! # Oddsmith Stress Tester
//!
//! Estimates the distribution of a strategy's performance rather than a
//! point estimate: a bootstrap over its settled bets for the ROI, and
//! shuffled Monte-Carlo bankroll paths for ruin and drawdown.
//!
//! ## Architectural Principles
//!
//! - **Two stages:** Every candidate gets a cheap prefilter. Only the best
//!   survivors get the full-fidelity finalist pass.
//! - **Bit-reproducible:** Each run is seeded from the candidate id and the
//!   configured base seed. Worker scheduling never touches a generator.
//! - **No silent passes:** A borderline failure may be re-scored at a
//!   reduced stake, and the result then records the scale that was used.
//!
//! ## Public API
//!
//! - `StressTester`: Runs both stages over candidates or a single ledger.
//! - `StressThresholds`: The pass/fail limits, read from the policy.

pub mod error;
pub mod resample;

pub use error::StressError;
pub use resample::{BetReturn, BootstrapSummary, PathSummary, bootstrap_roi, shuffled_paths};

use analytics::FitnessEvaluator;
use configuration::{Config, PolicyValues, StressConfig};
use core_types::{
    Candidate, MatchRecord, Rescue, StressCheck, StressResult, StressStage, derive_seed,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StressThresholds {
    pub min_bets: usize,
    pub min_prob_positive: f64,
    pub max_ruin: f64,
    pub max_drawdown_p95: f64,
}

impl From<&PolicyValues> for StressThresholds {
    fn from(policy: &PolicyValues) -> Self {
        Self {
            min_bets: policy.stress_min_bets,
            min_prob_positive: policy.stress_min_prob_positive,
            max_ruin: policy.stress_max_ruin,
            max_drawdown_p95: policy.stress_max_drawdown_p95,
        }
    }
}

fn stage_salt(stage: StressStage) -> &'static str {
    match stage {
        StressStage::Prefilter => "prefilter",
        StressStage::Finalist => "finalist",
    }
}

pub struct StressTester {
    config: StressConfig,
}

impl StressTester {
    pub fn new(config: StressConfig) -> Self {
        Self { config }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.stress.clone())
    }

    fn sample_counts(&self, stage: StressStage) -> (usize, usize) {
        match stage {
            StressStage::Prefilter => (self.config.prefilter_bootstrap, self.config.prefilter_paths),
            StressStage::Finalist => (self.config.finalist_bootstrap, self.config.finalist_paths),
        }
    }

    /// One stage at one stake scale, without rescue.
    pub fn measure(
        &self,
        id: &Uuid,
        bets: &[BetReturn],
        stage: StressStage,
        stake_scale: f64,
        thresholds: &StressThresholds,
    ) -> StressResult {
        let seed = derive_seed(id, self.config.base_seed, stage_salt(stage));
        let (bootstrap_samples, paths) = self.sample_counts(stage);

        let mut bootstrap_rng = StdRng::seed_from_u64(derive_seed(id, seed, "bootstrap"));
        let roi = bootstrap_roi(
            bets,
            bootstrap_samples,
            self.config.bootstrap_batch,
            self.config.ci_level,
            &mut bootstrap_rng,
        );
        let mut path_rng = StdRng::seed_from_u64(derive_seed(id, seed, "paths"));
        let path = shuffled_paths(
            bets,
            paths,
            stake_scale,
            self.config.ruin_level,
            &mut path_rng,
        );

        let mut failures = Vec::new();
        if bets.len() < thresholds.min_bets {
            failures.push(StressCheck::InsufficientBets);
        }
        if roi.prob_positive < thresholds.min_prob_positive {
            failures.push(StressCheck::ProbabilityPositive);
        }
        if path.ruin_probability > thresholds.max_ruin {
            failures.push(StressCheck::RuinProbability);
        }
        if path.drawdown_p95 > thresholds.max_drawdown_p95 {
            failures.push(StressCheck::DrawdownP95);
        }

        StressResult {
            stage,
            seed,
            bootstrap_samples,
            paths,
            prob_positive: roi.prob_positive,
            roi_mean: roi.roi_mean,
            roi_ci_low: roi.ci_low,
            roi_ci_high: roi.ci_high,
            ci_level: self.config.ci_level,
            ruin_probability: path.ruin_probability,
            drawdown_median: path.drawdown_median,
            drawdown_p95: path.drawdown_p95,
            early_terminated_paths: path.early_terminated,
            passed: failures.is_empty(),
            failures,
            rescue: None,
        }
    }

    /// Whether a failed result is close enough to pass at a smaller stake.
    /// Only the bankroll-path checks react to stake size.
    fn is_borderline(&self, result: &StressResult, thresholds: &StressThresholds) -> bool {
        let margin = self.config.borderline_margin;
        let relative_excess = |value: f64, limit: f64| {
            if limit > 0.0 { (value - limit) / limit } else { f64::INFINITY }
        };
        !result.failures.is_empty()
            && result.failures.iter().all(|check| match check {
                StressCheck::RuinProbability => {
                    relative_excess(result.ruin_probability, thresholds.max_ruin) <= margin
                }
                StressCheck::DrawdownP95 => {
                    relative_excess(result.drawdown_p95, thresholds.max_drawdown_p95) <= margin
                }
                StressCheck::InsufficientBets | StressCheck::ProbabilityPositive => false,
            })
    }

    /// One stage with rescue: a borderline failure is re-scored at each
    /// configured reduced stake in turn and the first passing scale is
    /// recorded on the result.
    pub fn assess(
        &self,
        id: &Uuid,
        bets: &[BetReturn],
        stage: StressStage,
        thresholds: &StressThresholds,
    ) -> StressResult {
        let full = self.measure(id, bets, stage, 1.0, thresholds);
        if full.passed || !self.is_borderline(&full, thresholds) {
            return full;
        }

        for &scale in &self.config.rescue_scales {
            let mut rescued = self.measure(id, bets, stage, scale, thresholds);
            if rescued.passed {
                debug!(candidate = %id, ?stage, scale, "Borderline candidate rescued");
                rescued.rescue = Some(Rescue {
                    stake_scale: scale,
                    failed_at_full_stake: full.failures.clone(),
                });
                return rescued;
            }
        }
        full
    }

    /// Prefilter followed, on a pass, by the finalist stage.
    pub fn assess_full(
        &self,
        id: &Uuid,
        bets: &[BetReturn],
        thresholds: &StressThresholds,
    ) -> StressResult {
        let prefilter = self.assess(id, bets, StressStage::Prefilter, thresholds);
        if !prefilter.passed {
            return prefilter;
        }
        self.assess(id, bets, StressStage::Finalist, thresholds)
    }

    fn thread_pool(&self) -> Result<rayon::ThreadPool, StressError> {
        let workers = if self.config.workers == 0 {
            num_cpus::get()
        } else {
            self.config.workers
        };
        rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| StressError::ThreadPool(e.to_string()))
    }

    /// Stress-tests a batch of candidates over `records` and attaches a result
    /// to each. The top prefilter survivors by objective get the finalist
    /// pass; everyone else keeps their prefilter result.
    pub fn run(
        &self,
        candidates: &mut [Candidate],
        evaluator: &FitnessEvaluator,
        records: &[MatchRecord],
        thresholds: &StressThresholds,
    ) -> Result<(), StressError> {
        let pool = self.thread_pool()?;

        let ledgers: Vec<Vec<BetReturn>> = pool.install(|| {
            candidates
                .par_iter()
                .map(|c| {
                    evaluator
                        .simulate(&c.dna, records)
                        .map(|ledger| ledger.iter().map(BetReturn::from).collect())
                })
                .collect::<Result<Vec<_>, _>>()
        })?;

        let prefilter: Vec<StressResult> = pool.install(|| {
            candidates
                .par_iter()
                .zip(&ledgers)
                .map(|(c, bets)| self.assess(&c.id, bets, StressStage::Prefilter, thresholds))
                .collect()
        });

        let mut survivors: Vec<usize> = (0..candidates.len())
            .filter(|&i| prefilter[i].passed)
            .collect();
        survivors.sort_by(|&a, &b| candidates[b].objective.total_cmp(&candidates[a].objective));
        survivors.truncate(self.config.finalists);

        let finalist: Vec<(usize, StressResult)> = pool.install(|| {
            survivors
                .par_iter()
                .map(|&i| {
                    let result = self.assess(
                        &candidates[i].id,
                        &ledgers[i],
                        StressStage::Finalist,
                        thresholds,
                    );
                    (i, result)
                })
                .collect()
        });

        for (candidate, result) in candidates.iter_mut().zip(prefilter) {
            candidate.stress = Some(result);
        }
        let mut passed = 0;
        for (i, result) in finalist {
            passed += usize::from(result.passed);
            candidates[i].stress = Some(result);
        }

        info!(
            candidates = candidates.len(),
            finalists = survivors.len(),
            passed,
            "Stress testing complete"
        );
        Ok(())
    }
}
