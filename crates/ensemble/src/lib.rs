//! # Oddsmith Ensemble Miner
//!
//! Runs the candidate search several times per market with different
//! deterministic seeds and separates the genes every run agrees on from the
//! ones that depend on the seed.
//!
//! ## Architectural Principles
//!
//! - **Search-agnostic:** The miner drives any `CandidateSearch`. Tests plug
//!   in a scripted search; production uses the `Arena`.
//! - **Explicit inputs:** The retraining cooldown, the clock and the data
//!   window are passed in with each request. The miner keeps no state
//!   between markets.
//!
//! ## Public API
//!
//! - `EnsembleMiner`: Mines one market.
//! - `MiningOutcome`: Gene statistics plus the archetype candidates, ready to
//!   be persisted as shadow strategies.

pub mod error;
pub mod genes;

pub use error::EnsembleError;
pub use genes::{GeneStats, consensus_dna, gene_statistics};

use analytics::{FitnessEvaluator, PopulationContext};
use arena::{CandidateSearch, SearchOutcome, SearchRequest};
use chrono::{DateTime, NaiveDate, Utc};
use configuration::{Config, EnsembleConfig, FitnessConfig};
use core_types::{
    Archetype, Candidate, Dna, GeneRanges, Lifecycle, Lineage, MarketId, MatchRecord,
    OptimizationNotes, SearchMode, ShadowState, Strategy,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// One mining session of one market.
#[derive(Debug, Clone)]
pub struct MiningRequest<'a> {
    pub market: MarketId,
    pub records: &'a [MatchRecord],
    pub ranges: GeneRanges,
    pub mode: SearchMode,
    pub reliability: Option<f64>,
    pub regime_split: f64,
    pub show_progress: bool,
    pub now: DateTime<Utc>,
    /// End of the market's retraining cooldown, if one is running.
    pub cooldown_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MinedCandidate {
    pub archetype: Archetype,
    pub candidate: Candidate,
}

#[derive(Debug, Clone, Serialize)]
pub struct MiningOutcome {
    pub market: MarketId,
    pub mode: SearchMode,
    pub seeds: Vec<u64>,
    /// Champion of each run, in seed order.
    pub champions: Vec<Candidate>,
    pub gene_stats: Vec<GeneStats>,
    pub robust_genes: Vec<String>,
    pub unstable_genes: Vec<String>,
    pub archetypes: Vec<MinedCandidate>,
    pub training_window: (NaiveDate, NaiveDate),
    pub validation_window: (NaiveDate, NaiveDate),
    pub population_diversity: f64,
}

impl MiningOutcome {
    /// Shadow strategies for every archetype, ready to be persisted. Each
    /// gets a fresh id so repeated sessions on one market append to the
    /// history; the candidate id is kept in the notes.
    pub fn to_strategies(
        &self,
        lookback_years: u32,
        decay_floor: f64,
        created_at: DateTime<Utc>,
    ) -> Vec<Strategy> {
        self.archetypes
            .iter()
            .map(|mined| {
                let candidate = &mined.candidate;
                Strategy {
                    id: Uuid::new_v4(),
                    market: self.market.clone(),
                    dna: candidate.dna.clone(),
                    generation: candidate.lineage.generation,
                    training: candidate.training,
                    validation: *candidate.validation_or_training(),
                    stress: candidate.stress.clone(),
                    archetype: Some(mined.archetype),
                    notes: OptimizationNotes {
                        seed: candidate.lineage.seed,
                        mode: self.mode,
                        training_window: self.training_window,
                        validation_window: self.validation_window,
                        lookback_years,
                        decay_floor,
                        population_diversity: self.population_diversity,
                        ensemble_runs: Some(self.seeds.len()),
                        robust_genes: self.robust_genes.clone(),
                        unstable_genes: self.unstable_genes.clone(),
                        candidate_id: Some(candidate.id),
                    },
                    created_at,
                    lifecycle: Lifecycle::Shadow(ShadowState::default()),
                    version: 0,
                }
            })
            .collect()
    }
}

fn best_by<'a>(
    candidates: impl Iterator<Item = &'a Candidate>,
    key: impl Fn(&Candidate) -> f64,
) -> Option<&'a Candidate> {
    candidates.fold(None, |best: Option<&Candidate>, c| match best {
        Some(b) if key(b) >= key(c) => Some(b),
        _ => Some(c),
    })
}

pub struct EnsembleMiner<S: CandidateSearch> {
    search: S,
    config: EnsembleConfig,
    fitness: FitnessConfig,
    validation_fraction: f64,
}

impl<S: CandidateSearch> EnsembleMiner<S> {
    pub fn new(
        search: S,
        config: EnsembleConfig,
        fitness: FitnessConfig,
        validation_fraction: f64,
    ) -> Self {
        Self {
            search,
            config,
            fitness,
            validation_fraction,
        }
    }

    pub fn from_config(search: S, config: &Config) -> Self {
        Self::new(
            search,
            config.ensemble.clone(),
            config.fitness.clone(),
            config.arena.validation_fraction,
        )
    }

    /// The seeds of a session: `base_seed, base_seed + 1, ...`.
    pub fn seeds(&self) -> Vec<u64> {
        (0..self.config.runs as u64)
            .map(|i| self.config.base_seed.wrapping_add(i))
            .collect()
    }

    fn progress_bar(&self, show: bool) -> Result<ProgressBar, EnsembleError> {
        if !show {
            return Ok(ProgressBar::hidden());
        }
        let bar = ProgressBar::new(self.config.runs as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} runs ({eta}) {msg}")?
                .progress_chars("=>-"),
        );
        Ok(bar)
    }

    pub fn mine(&self, request: &MiningRequest<'_>) -> Result<MiningOutcome, EnsembleError> {
        if let Some(until) = request.cooldown_until.filter(|until| *until > request.now) {
            warn!(market = %request.market, %until, "Mining refused during retraining cooldown");
            return Err(EnsembleError::Cooldown {
                market: request.market.clone(),
                until,
            });
        }
        if self.config.runs < 2 {
            return Err(EnsembleError::TooFewRuns(self.config.runs));
        }

        let seeds = self.seeds();
        info!(market = %request.market, runs = seeds.len(), base_seed = self.config.base_seed, "Starting ensemble mining");

        let progress = self.progress_bar(request.show_progress)?;
        let mut outcomes: Vec<SearchOutcome> = Vec::with_capacity(seeds.len());
        for &seed in &seeds {
            progress.set_message(format!("seed {seed}"));
            let outcome = self.search.search(&SearchRequest {
                market: request.market.clone(),
                records: request.records,
                ranges: request.ranges.clone(),
                mode: request.mode,
                seed,
                reliability: request.reliability,
                regime_split: request.regime_split,
                show_progress: false,
            })?;
            outcomes.push(outcome);
            progress.inc(1);
        }
        progress.finish_and_clear();

        let champions: Vec<Candidate> = outcomes.iter().map(|o| o.champion.clone()).collect();
        let champion_dna: Vec<&Dna> = champions.iter().map(|c| &c.dna).collect();
        let gene_stats = gene_statistics(&champion_dna, self.config.robust_cv_threshold);
        let (robust, unstable): (Vec<&GeneStats>, Vec<&GeneStats>) =
            gene_stats.iter().partition(|s| s.robust);
        let robust_genes: Vec<String> = robust.iter().map(|s| s.gene.clone()).collect();
        let unstable_genes: Vec<String> = unstable.iter().map(|s| s.gene.clone()).collect();

        let best = best_by(champions.iter(), |c| c.validation_or_training().fitness)
            .ok_or(EnsembleError::TooFewRuns(0))?;
        let consensus = self.consensus_candidate(request, &gene_stats, best, &champions)?;

        let mut archetypes = vec![MinedCandidate {
            archetype: Archetype::Consensus,
            candidate: consensus,
        }];
        if self.config.archetypes {
            let pooled = || outcomes.iter().flat_map(|o| o.population.iter());
            let profit = best_by(pooled(), |c| c.validation_or_training().roi);
            let profitable: Vec<&Candidate> = pooled()
                .filter(|c| c.validation_or_training().roi >= 0.0)
                .collect();
            let volume = if profitable.is_empty() {
                best_by(pooled(), |c| c.validation_or_training().weighted_bets)
            } else {
                best_by(profitable.into_iter(), |c| c.validation_or_training().weighted_bets)
            };
            for (archetype, candidate) in [
                (Archetype::ProfitSeeking, profit),
                (Archetype::HighVolume, volume),
            ] {
                let Some(candidate) = candidate else { continue };
                if archetypes.iter().any(|m| m.candidate.id == candidate.id) {
                    continue;
                }
                archetypes.push(MinedCandidate {
                    archetype,
                    candidate: candidate.clone(),
                });
            }
        }

        let first = &outcomes[0];
        let population_diversity =
            outcomes.iter().map(|o| o.population_diversity).sum::<f64>() / outcomes.len() as f64;

        info!(
            market = %request.market,
            robust = robust_genes.len(),
            unstable = unstable_genes.len(),
            archetypes = archetypes.len(),
            "Ensemble mining complete"
        );

        Ok(MiningOutcome {
            market: request.market.clone(),
            mode: request.mode,
            seeds,
            champions,
            gene_stats,
            robust_genes,
            unstable_genes,
            archetypes,
            training_window: first.training_window,
            validation_window: first.validation_window,
            population_diversity,
        })
    }

    /// Builds and scores the consensus DNA on the same windows the runs used.
    fn consensus_candidate(
        &self,
        request: &MiningRequest<'_>,
        gene_stats: &[GeneStats],
        best: &Candidate,
        champions: &[Candidate],
    ) -> Result<Candidate, EnsembleError> {
        let mut dna = consensus_dna(gene_stats, &best.dna)?;
        request.ranges.clamp(&mut dna.low_vol);
        request.ranges.clamp(&mut dna.high_vol);

        let evaluator = FitnessEvaluator::new(self.fitness.clone(), request.regime_split);
        let split = arena::folds::holdout(request.records, self.validation_fraction);
        let context = PopulationContext::from_population(
            champions.iter().map(|c| &c.dna),
            &request.ranges,
            Vec::new(),
        );
        let training = evaluator.evaluate(&dna, &request.ranges, &split.training, Some(&context))?;
        let validation =
            evaluator.evaluate(&dna, &request.ranges, &split.validation, Some(&context))?;

        Ok(Candidate {
            // Generation `usize::MAX` never occurs in a search, so the id
            // cannot collide with a run's candidates.
            id: Candidate::derive_id(&request.market, self.config.base_seed, usize::MAX, 0),
            market: request.market.clone(),
            dna,
            lineage: Lineage {
                seed: self.config.base_seed,
                generation: best.lineage.generation,
                parents: champions.iter().map(|c| c.id).collect(),
            },
            training: training.terms,
            validation: Some(validation.terms),
            objective: validation.terms.fitness,
            stress: None,
        })
    }
}
