use crate::policy::PolicyConfig;
use core_types::{Cadence, GeneRange, GeneRanges, MarketId, SearchMode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// The root configuration structure for the entire application.
///
/// Every section has defaults, so an empty (or missing) `config.toml` is a
/// valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fitness: FitnessConfig,
    pub arena: ArenaConfig,
    pub stress: StressConfig,
    pub ensemble: EnsembleConfig,
    pub time_machine: TimeMachineConfig,
    pub promotion: PromotionConfig,
    pub backtest: BacktestConfig,
    pub engine: EngineConfig,
    /// Per-market settings keyed by market identifier.
    pub markets: BTreeMap<String, MarketConfig>,
    pub policy: PolicyConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Gene ranges for a market: the betting defaults with any declared
    /// per-market ranges laid over them.
    pub fn gene_ranges(&self, market: &MarketId) -> GeneRanges {
        let mut ranges = GeneRanges::betting_defaults();
        if let Some(market_cfg) = self.markets.get(market.as_str()) {
            for (gene, range) in &market_cfg.gene_ranges {
                ranges.0.insert(gene.clone(), *range);
            }
        }
        ranges
    }

    /// Markets named in the `[markets]` table.
    pub fn configured_markets(&self) -> Vec<MarketId> {
        self.markets.keys().map(MarketId::new).collect()
    }

    /// Rejects configurations that would make the search or the stress
    /// tester meaningless.
    pub fn validate(&self) -> Result<(), crate::ConfigError> {
        let fail = |msg: &str| Err(crate::ConfigError::ValidationError(msg.to_string()));

        if !(0.0..=1.0).contains(&self.fitness.decay_floor) {
            return fail("fitness.decay_floor must lie in [0, 1]");
        }
        if self.fitness.ece_buckets == 0 {
            return fail("fitness.ece_buckets must be positive");
        }
        if self.arena.quick.population < 2 || self.arena.deep.population < 2 {
            return fail("arena populations need at least two members");
        }
        if self.arena.mutation_min > self.arena.mutation_max {
            return fail("arena.mutation_min exceeds arena.mutation_max");
        }
        if self.arena.cv_folds < 2 {
            return fail("arena.cv_folds must be at least 2");
        }
        if !(0.0..1.0).contains(&self.arena.validation_fraction) {
            return fail("arena.validation_fraction must lie in [0, 1)");
        }
        if self.stress.prefilter_bootstrap == 0 || self.stress.finalist_bootstrap == 0 {
            return fail("stress resample counts must be positive");
        }
        if !(0.5..1.0).contains(&self.stress.ci_level) {
            return fail("stress.ci_level must lie in [0.5, 1)");
        }
        if self.ensemble.runs < 2 {
            return fail("ensemble.runs must be at least 2");
        }
        if self.promotion.conflict_attempts == 0 {
            return fail("promotion.conflict_attempts must be at least 1");
        }
        if self.time_machine.lookback_years == 0 {
            return fail("time_machine.lookback_years must be positive");
        }
        let engine = &self.engine;
        if engine.live_concurrency == 0 || engine.risk_concurrency == 0 || engine.batch_concurrency == 0 {
            return fail("engine concurrency limits must be positive");
        }
        if engine.latency_window < engine.min_latency_samples {
            return fail("engine.latency_window is smaller than engine.min_latency_samples");
        }
        for (market, market_cfg) in &self.markets {
            for (gene, range) in &market_cfg.gene_ranges {
                if !(range.min <= range.max) {
                    return Err(crate::ConfigError::ValidationError(format!(
                        "markets.{market}.gene_ranges.{gene}: min exceeds max"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Weights of the final fitness combination. Each multiplies a clipped term.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FitnessWeights {
    pub roi: f64,
    pub sharpe: f64,
    pub drawdown: f64,
    pub friction_roi: f64,
    pub expected_roi: f64,
    pub calibration: f64,
    pub volume: f64,
    pub complexity: f64,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self {
            roi: 0.30,
            sharpe: 0.20,
            drawdown: 0.15,
            friction_roi: 0.10,
            expected_roi: 0.10,
            calibration: 0.10,
            volume: 0.05,
            complexity: 0.10,
        }
    }
}

/// Parameters of the Fitness Evaluator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FitnessConfig {
    pub weights: FitnessWeights,
    /// Lowest time-decay weight an old bet can receive.
    pub decay_floor: f64,
    pub ece_buckets: usize,
    /// Buckets with fewer samples than this are shrunk toward their prior.
    pub ece_min_bucket_n: usize,
    /// Execution slippage as a fraction of the quoted odds.
    pub slippage: f64,
    /// Fee charged per unit staked.
    pub fee: f64,
    /// Largest stake, as a bankroll fraction, the market can absorb per bet.
    pub liquidity_ceiling: f64,
    /// ROI that maps to a full +1 term before clipping.
    pub roi_scale: f64,
    pub sharpe_scale: f64,
    pub drawdown_scale: f64,
    /// Weighted bet count below which the volume term scales down.
    pub min_bets_target: f64,
}

impl Default for FitnessConfig {
    fn default() -> Self {
        Self {
            weights: FitnessWeights::default(),
            decay_floor: 0.20,
            ece_buckets: 10,
            ece_min_bucket_n: 20,
            slippage: 0.01,
            fee: 0.02,
            liquidity_ceiling: 0.02,
            roi_scale: 0.20,
            sharpe_scale: 0.30,
            drawdown_scale: 0.50,
            min_bets_target: 30.0,
        }
    }
}

/// Population size and generation budget of one search mode.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SearchBudget {
    pub population: usize,
    pub generations: usize,
}

/// Hard-ish constraints the search penalizes (scaled down in the relaxed stage).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConstraints {
    pub min_bets: usize,
    pub max_drawdown: f64,
    /// Fitness subtracted per unit of constraint violation.
    pub penalty: f64,
}

impl Default for SearchConstraints {
    fn default() -> Self {
        Self {
            min_bets: 20,
            max_drawdown: 0.35,
            penalty: 1.0,
        }
    }
}

/// Parameters of the evolutionary candidate search.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    pub mode: SearchMode,
    pub quick: SearchBudget,
    pub deep: SearchBudget,
    pub tournament_size: usize,
    pub elite_count: usize,
    pub crossover_rate: f64,
    pub mutation_base: f64,
    pub mutation_min: f64,
    pub mutation_max: f64,
    /// Gaussian mutation width as a fraction of each gene's span.
    pub mutation_sigma: f64,
    /// Probability that a linked gene pair is inherited from one parent.
    pub linked_pair_probability: f64,
    /// Absolute rank-contribution correlation above which two genes are linked.
    pub linkage_threshold: f64,
    pub cv_folds: usize,
    /// Share of the generation budget spent in the relaxed stage.
    pub relaxed_fraction: f64,
    /// Multiplier applied to constraint penalties during the relaxed stage.
    pub relaxation_factor: f64,
    pub constraints: SearchConstraints,
    /// Most recent share of the history held out for validation.
    pub validation_fraction: f64,
    pub seed: u64,
    /// Evaluation threads; zero means one per core.
    pub workers: usize,
    /// Market reliability assumed when no calibration snapshot exists.
    pub default_reliability: f64,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            mode: SearchMode::Quick,
            quick: SearchBudget {
                population: 24,
                generations: 12,
            },
            deep: SearchBudget {
                population: 64,
                generations: 30,
            },
            tournament_size: 3,
            elite_count: 2,
            crossover_rate: 0.7,
            mutation_base: 0.15,
            mutation_min: 0.05,
            mutation_max: 0.45,
            mutation_sigma: 0.10,
            linked_pair_probability: 0.8,
            linkage_threshold: 0.5,
            cv_folds: 4,
            relaxed_fraction: 0.4,
            relaxation_factor: 0.25,
            constraints: SearchConstraints::default(),
            validation_fraction: 0.2,
            seed: 42,
            workers: 0,
            default_reliability: 0.5,
        }
    }
}

impl ArenaConfig {
    pub fn budget(&self, mode: SearchMode) -> SearchBudget {
        match mode {
            SearchMode::Quick => self.quick,
            SearchMode::Deep => self.deep,
        }
    }
}

/// Parameters of the Stress Tester. Pass/fail thresholds come from the
/// policy snapshot.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    pub prefilter_bootstrap: usize,
    pub prefilter_paths: usize,
    pub finalist_bootstrap: usize,
    pub finalist_paths: usize,
    /// Resamples drawn per batch.
    pub bootstrap_batch: usize,
    /// Bankroll fraction lost that counts as ruin and ends a path early.
    pub ruin_level: f64,
    pub ci_level: f64,
    /// Reduced stake scales tried, in order, for borderline failures.
    pub rescue_scales: Vec<f64>,
    /// Relative distance to a threshold within which a failure is borderline.
    pub borderline_margin: f64,
    /// How many prefilter survivors get a finalist pass.
    pub finalists: usize,
    pub base_seed: u64,
    /// Worker threads; zero means one per core.
    pub workers: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            prefilter_bootstrap: 256,
            prefilter_paths: 256,
            finalist_bootstrap: 2000,
            finalist_paths: 1000,
            bootstrap_batch: 64,
            ruin_level: 0.5,
            ci_level: 0.95,
            rescue_scales: vec![0.5, 0.25],
            borderline_margin: 0.15,
            finalists: 5,
            base_seed: 7,
            workers: 0,
        }
    }
}

/// Parameters of the Ensemble Miner.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub runs: usize,
    pub base_seed: u64,
    /// Coefficient of variation at or below which a gene counts as robust.
    pub robust_cv_threshold: f64,
    /// Persist the profit-seeking and high-volume variants as well.
    pub archetypes: bool,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            runs: 10,
            base_seed: 1000,
            robust_cv_threshold: 0.15,
            archetypes: true,
        }
    }
}

/// Parameters of the Time-Machine runner.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeMachineConfig {
    pub lookback_years: u32,
    /// Trailing months each snapshot is computed over.
    pub window_months: u32,
    pub cadence: Cadence,
    /// Parallel market workers; zero means one per core.
    pub workers: usize,
    pub sequential: bool,
    pub script_version: String,
}

impl Default for TimeMachineConfig {
    fn default() -> Self {
        Self {
            lookback_years: 8,
            window_months: 24,
            cadence: Cadence::Auto,
            workers: 0,
            sequential: false,
            script_version: "tm-2".to_string(),
        }
    }
}

/// Lifecycle write settings of the Promotion Manager. Promotion thresholds
/// themselves live in the policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromotionConfig {
    /// Attempts at a lifecycle write before giving up on a contended market.
    pub conflict_attempts: u32,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            conflict_attempts: 5,
        }
    }
}

/// Parameters for strategy replays.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub initial_bankroll: Decimal,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_bankroll: dec!(1000),
        }
    }
}

/// Runtime limits of the live service and the workload governor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Live decisions kept in the rolling latency window.
    pub latency_window: usize,
    /// Live p95 latency above which batch work pauses.
    pub p95_ceiling_ms: u64,
    /// Minimum samples before the breaker may open.
    pub min_latency_samples: usize,
    /// Samples older than this no longer count towards the p95.
    pub latency_horizon_secs: u64,
    pub live_concurrency: usize,
    pub risk_concurrency: usize,
    pub batch_concurrency: usize,
    pub breaker_poll_ms: u64,
    pub inference_timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            latency_window: 256,
            p95_ceiling_ms: 250,
            min_latency_samples: 20,
            latency_horizon_secs: 60,
            live_concurrency: 64,
            risk_concurrency: 4,
            batch_concurrency: 2,
            breaker_poll_ms: 50,
            inference_timeout_ms: 150,
            retry_attempts: 3,
            retry_backoff_ms: 200,
        }
    }
}

/// Settings for one market.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Overrides for individual gene ranges; undeclared genes keep defaults.
    pub gene_ranges: BTreeMap<String, GeneRange>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// When set, logs are also written to a daily rolling file here.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "oddsmith.log".to_string(),
        }
    }
}
