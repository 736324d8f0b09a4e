use serde::{Deserialize, Serialize};

/// Which pass of the stress tester produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressStage {
    Prefilter,
    Finalist,
}

/// A single policy threshold a resampled distribution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressCheck {
    InsufficientBets,
    ProbabilityPositive,
    RuinProbability,
    DrawdownP95,
}

/// Records that a borderline candidate was re-scored at a reduced stake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rescue {
    pub stake_scale: f64,
    /// The checks the candidate failed at full stake.
    pub failed_at_full_stake: Vec<StressCheck>,
}

/// Summary of a strategy's resampled performance distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressResult {
    pub stage: StressStage,
    pub seed: u64,
    pub bootstrap_samples: usize,
    pub paths: usize,
    pub prob_positive: f64,
    pub roi_mean: f64,
    pub roi_ci_low: f64,
    pub roi_ci_high: f64,
    pub ci_level: f64,
    pub ruin_probability: f64,
    pub drawdown_median: f64,
    pub drawdown_p95: f64,
    /// Paths abandoned early once their loss trajectory crossed the fail-fast level.
    pub early_terminated_paths: usize,
    pub failures: Vec<StressCheck>,
    pub passed: bool,
    pub rescue: Option<Rescue>,
}
