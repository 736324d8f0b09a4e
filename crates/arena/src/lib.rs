//! # Oddsmith Arena
//!
//! The evolutionary candidate search. For one market it breeds a population
//! of DNA over a fixed generation budget and hands back Pareto-efficient
//! candidates plus a compromise champion.
//!
//! ## Architectural Principles
//!
//! - **Deterministic:** All randomness flows from one seeded `StdRng` on the
//!   coordinating thread. Scoring runs in parallel but is a pure function of
//!   the DNA, so results do not depend on scheduling.
//! - **Two stages:** A relaxed-constraint stage keeps the population broad;
//!   the tightened stage then works on the survivors.
//! - **No persistence:** The arena returns `Candidate`s. Whoever asked for
//!   the search decides what to store.
//!
//! ## Public API
//!
//! - `Arena`: The search itself, behind the `CandidateSearch` trait.
//! - `SearchRequest` / `SearchOutcome`: Inputs and results of one search.

pub mod error;
pub mod folds;
pub mod linkage;
pub mod operators;
pub mod pareto;

pub use error::ArenaError;
pub use pareto::Objectives;

use analytics::stats::{mean, std_dev};
use analytics::{FitnessEvaluator, LinkedPair, PopulationContext, normalized_flat};
use chrono::NaiveDate;
use configuration::{ArenaConfig, Config, FitnessConfig, SearchConstraints};
use core_types::{
    Candidate, Dna, FitnessTerms, GeneRanges, Lineage, MarketId, MatchRecord, SearchMode,
};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

/// One search of one market.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub market: MarketId,
    pub records: &'a [MatchRecord],
    pub ranges: GeneRanges,
    pub mode: SearchMode,
    pub seed: u64,
    /// Reliability score of the market's history in `[0, 1]`, if known.
    pub reliability: Option<f64>,
    pub regime_split: f64,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub market: MarketId,
    pub seed: u64,
    pub mode: SearchMode,
    pub champion: Candidate,
    /// The Pareto front, best objective first. Contains the champion.
    pub front: Vec<Candidate>,
    /// Every candidate that reached final selection.
    pub population: Vec<Candidate>,
    pub training_window: (NaiveDate, NaiveDate),
    pub validation_window: (NaiveDate, NaiveDate),
    pub population_diversity: f64,
    pub linked_pairs: Vec<LinkedPair>,
}

/// Anything that can turn a search request into candidates. The ensemble
/// miner depends on this rather than on `Arena` directly.
pub trait CandidateSearch: Send + Sync {
    fn search(&self, request: &SearchRequest<'_>) -> Result<SearchOutcome, ArenaError>;
}

/// `mean - 0.5 * std` over per-fold fitness values.
pub fn cv_objective(fold_fitness: &[f64]) -> f64 {
    mean(fold_fitness) - 0.5 * std_dev(fold_fitness)
}

/// Weighted constraint violation: relative bet shortfall plus relative
/// drawdown excess.
pub fn constraint_violation(terms: &FitnessTerms, constraints: &SearchConstraints) -> f64 {
    let shortfall = if constraints.min_bets > 0 {
        constraints.min_bets.saturating_sub(terms.bet_count) as f64 / constraints.min_bets as f64
    } else {
        0.0
    };
    let excess = if constraints.max_drawdown > 0.0 {
        (terms.max_drawdown - constraints.max_drawdown).max(0.0) / constraints.max_drawdown
    } else {
        0.0
    };
    constraints.penalty * (shortfall + excess)
}

/// Mean pairwise distance between normalized DNAs, in `[0, 1]`.
pub fn population_diversity(population: &[&Dna], ranges: &GeneRanges) -> f64 {
    let flats: Vec<Vec<f64>> = population
        .iter()
        .map(|dna| normalized_flat(dna, ranges).into_values().collect())
        .collect();
    let distances: Vec<f64> = flats
        .iter()
        .tuple_combinations()
        .map(|(a, b)| {
            let gaps: Vec<f64> = a.iter().zip(b).map(|(x, y)| (x - y).abs()).collect();
            mean(&gaps)
        })
        .collect();
    mean(&distances)
}

#[derive(Debug, Clone)]
struct Individual {
    id: Uuid,
    dna: Dna,
    lineage: Lineage,
}

#[derive(Debug, Clone, Copy)]
struct Scored {
    terms: FitnessTerms,
    objective: f64,
}

/// Everything a worker needs to score one DNA within a generation.
struct Scorer<'a> {
    evaluator: &'a FitnessEvaluator,
    ranges: &'a GeneRanges,
    training: &'a [MatchRecord],
    folds: &'a [&'a [MatchRecord]],
    context: &'a PopulationContext,
    constraints: &'a SearchConstraints,
    penalty_scale: f64,
}

impl Scorer<'_> {
    fn score(&self, dna: &Dna) -> Result<Scored, ArenaError> {
        let evaluation = self
            .evaluator
            .evaluate(dna, self.ranges, self.training, Some(self.context))?;

        let base = if self.folds.is_empty() {
            evaluation.terms.fitness
        } else {
            let per_fold = self
                .folds
                .iter()
                .map(|fold| {
                    self.evaluator
                        .evaluate(dna, self.ranges, fold, Some(self.context))
                        .map(|e| e.terms.fitness)
                })
                .collect::<Result<Vec<f64>, _>>()?;
            cv_objective(&per_fold)
        };

        let violation = constraint_violation(&evaluation.terms, self.constraints);
        Ok(Scored {
            terms: evaluation.terms,
            objective: base - self.penalty_scale * violation,
        })
    }
}

/// Indices ordered best objective first; ties keep population order.
fn ranking(scores: &[Scored]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].objective.total_cmp(&scores[a].objective));
    order
}

pub struct Arena {
    config: ArenaConfig,
    fitness: FitnessConfig,
}

impl Arena {
    pub fn new(config: ArenaConfig, fitness: FitnessConfig) -> Self {
        Self { config, fitness }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.arena.clone(), config.fitness.clone())
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    fn progress_bar(&self, len: usize, show: bool) -> Result<ProgressBar, ArenaError> {
        if !show {
            return Ok(ProgressBar::hidden());
        }
        let bar = ProgressBar::new(len as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} gen ({eta}) {msg}")?
                .progress_chars("=>-"),
        );
        Ok(bar)
    }

    fn thread_pool(&self) -> Result<rayon::ThreadPool, ArenaError> {
        let workers = if self.config.workers == 0 {
            num_cpus::get()
        } else {
            self.config.workers
        };
        rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| ArenaError::ThreadPool(e.to_string()))
    }

    fn initial_population(
        &self,
        rng: &mut StdRng,
        request: &SearchRequest<'_>,
        size: usize,
    ) -> Vec<Individual> {
        (0..size)
            .map(|slot| {
                // Slot zero starts at the centre of the search space.
                let dna = if slot == 0 {
                    Dna::uniform(request.ranges.midpoint_vector())
                } else {
                    operators::random_dna(rng, &request.ranges)
                };
                Individual {
                    id: Candidate::derive_id(&request.market, request.seed, 0, slot),
                    dna,
                    lineage: Lineage {
                        seed: request.seed,
                        generation: 0,
                        parents: Vec::new(),
                    },
                }
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn breed(
        &self,
        rng: &mut StdRng,
        request: &SearchRequest<'_>,
        population: &[Individual],
        scores: &[Scored],
        generation: usize,
        mutation_rate: f64,
        linked_pairs: &[LinkedPair],
    ) -> Result<Vec<Individual>, ArenaError> {
        let size = population.len();
        let order = ranking(scores);
        let objectives: Vec<f64> = scores.iter().map(|s| s.objective).collect();

        let mut next: Vec<Individual> = order
            .iter()
            .take(self.config.elite_count.min(size))
            .map(|&i| population[i].clone())
            .collect();

        for slot in next.len()..size {
            let a = &population[operators::tournament(&objectives, rng, self.config.tournament_size)];
            let b = &population[operators::tournament(&objectives, rng, self.config.tournament_size)];

            let (mut dna, parents) = if rng.gen_bool(self.config.crossover_rate.clamp(0.0, 1.0)) {
                let child = operators::crossover(
                    &a.dna,
                    &b.dna,
                    rng,
                    linked_pairs,
                    self.config.linked_pair_probability,
                )?;
                (child, vec![a.id, b.id])
            } else {
                (a.dna.clone(), vec![a.id])
            };
            operators::mutate(
                &mut dna,
                rng,
                mutation_rate,
                self.config.mutation_sigma,
                &request.ranges,
            );

            next.push(Individual {
                id: Candidate::derive_id(&request.market, request.seed, generation, slot),
                dna,
                lineage: Lineage {
                    seed: request.seed,
                    generation,
                    parents,
                },
            });
        }
        Ok(next)
    }
}

impl CandidateSearch for Arena {
    fn search(&self, request: &SearchRequest<'_>) -> Result<SearchOutcome, ArenaError> {
        let split = folds::holdout(request.records, self.config.validation_fraction);
        let (Some(training_window), Some(validation_window)) = (
            folds::window_of(&split.training),
            folds::window_of(&split.validation),
        ) else {
            return Err(ArenaError::NotEnoughData(format!(
                "market {} has {} settled records, need a training and a validation window",
                request.market,
                split.training.len() + split.validation.len()
            )));
        };

        let budget = self.config.budget(request.mode);
        let size = budget.population.max(2);
        let generations = budget.generations.max(1);
        let relaxed_generations =
            ((generations as f64) * self.config.relaxed_fraction.clamp(0.0, 1.0)).round() as usize;
        let mutation_rate = operators::adaptive_mutation_rate(
            self.config.mutation_base,
            request.reliability.unwrap_or(self.config.default_reliability),
            self.config.mutation_min,
            self.config.mutation_max,
        );

        info!(
            market = %request.market,
            seed = request.seed,
            mode = ?request.mode,
            population = size,
            generations,
            mutation_rate,
            training = split.training.len(),
            validation = split.validation.len(),
            "Starting candidate search"
        );

        let evaluator = FitnessEvaluator::new(self.fitness.clone(), request.regime_split);
        let cv_folds: Vec<&[MatchRecord]> = match request.mode {
            SearchMode::Deep => folds::time_folds(&split.training, self.config.cv_folds),
            SearchMode::Quick => Vec::new(),
        };
        let pool = self.thread_pool()?;
        let progress = self.progress_bar(generations, request.show_progress)?;

        let mut rng = StdRng::seed_from_u64(request.seed);
        let mut population = self.initial_population(&mut rng, request, size);
        let mut linked_pairs: Vec<LinkedPair> = Vec::new();
        let mut scores: Vec<Scored> = Vec::new();
        let mut context = PopulationContext::default();

        for generation in 0..generations {
            context = PopulationContext::from_population(
                population.iter().map(|i| &i.dna),
                &request.ranges,
                linked_pairs.clone(),
            );
            let scorer = Scorer {
                evaluator: &evaluator,
                ranges: &request.ranges,
                training: &split.training,
                folds: &cv_folds,
                context: &context,
                constraints: &self.config.constraints,
                penalty_scale: if generation < relaxed_generations {
                    self.config.relaxation_factor
                } else {
                    1.0
                },
            };
            scores = pool.install(|| {
                population
                    .par_iter()
                    .map(|individual| scorer.score(&individual.dna))
                    .collect::<Result<Vec<Scored>, ArenaError>>()
            })?;

            let ranked: Vec<(&Dna, f64)> = population
                .iter()
                .zip(&scores)
                .map(|(i, s)| (&i.dna, s.objective))
                .collect();
            linked_pairs = linkage::detect_linked_pairs(
                &ranked,
                &request.ranges,
                self.config.linkage_threshold,
            );

            let best = scores
                .iter()
                .map(|s| s.objective)
                .fold(f64::NEG_INFINITY, f64::max);
            debug!(
                market = %request.market,
                generation,
                best_objective = best,
                linked_pairs = linked_pairs.len(),
                relaxed = generation < relaxed_generations,
                "Generation scored"
            );
            progress.set_message(format!("best {best:.4}"));
            progress.inc(1);

            if generation + 1 < generations {
                population = self.breed(
                    &mut rng,
                    request,
                    &population,
                    &scores,
                    generation + 1,
                    mutation_rate,
                    &linked_pairs,
                )?;
            }
        }
        progress.finish_and_clear();

        // Deep mode only lets the better half by CV objective into final selection.
        let order = ranking(&scores);
        let finalists: Vec<usize> = match request.mode {
            SearchMode::Deep => order.iter().copied().take(size.div_ceil(2)).collect(),
            SearchMode::Quick => order.clone(),
        };

        let validation: Vec<FitnessTerms> = pool.install(|| {
            finalists
                .par_iter()
                .map(|&i| {
                    evaluator
                        .evaluate(
                            &population[i].dna,
                            &request.ranges,
                            &split.validation,
                            Some(&context),
                        )
                        .map(|e| e.terms)
                })
                .collect::<Result<Vec<FitnessTerms>, _>>()
        })?;

        let candidates: Vec<Candidate> = finalists
            .iter()
            .zip(validation)
            .map(|(&i, validation)| Candidate {
                id: population[i].id,
                market: request.market.clone(),
                dna: population[i].dna.clone(),
                lineage: population[i].lineage.clone(),
                training: scores[i].terms,
                validation: Some(validation),
                objective: scores[i].objective,
                stress: None,
            })
            .collect();

        let points: Vec<Objectives> = candidates.iter().map(|c| Objectives::from(&c.training)).collect();
        let front_idx = pareto::pareto_front(&points);
        let champion_idx = pareto::compromise(&points, &front_idx).ok_or_else(|| {
            ArenaError::NotEnoughData(format!("no candidates survived for {}", request.market))
        })?;
        let champion = candidates[champion_idx].clone();
        let front: Vec<Candidate> = front_idx.iter().map(|&i| candidates[i].clone()).collect();

        let dnas: Vec<&Dna> = population.iter().map(|i| &i.dna).collect();
        let diversity = population_diversity(&dnas, &request.ranges);

        info!(
            market = %request.market,
            seed = request.seed,
            champion = %champion.id,
            objective = champion.objective,
            validation_roi = champion.validation_or_training().roi,
            front = front.len(),
            diversity,
            "Candidate search complete"
        );

        Ok(SearchOutcome {
            market: request.market.clone(),
            seed: request.seed,
            mode: request.mode,
            champion,
            front,
            population: candidates,
            training_window,
            validation_window,
            population_diversity: diversity,
            linked_pairs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use configuration::SearchBudget;
    use core_types::fixtures::synthetic_history;

    fn small_arena() -> Arena {
        let config = ArenaConfig {
            quick: SearchBudget {
                population: 10,
                generations: 4,
            },
            deep: SearchBudget {
                population: 8,
                generations: 3,
            },
            workers: 2,
            ..ArenaConfig::default()
        };
        Arena::new(config, FitnessConfig::default())
    }

    fn request(records: &[MatchRecord], mode: SearchMode, seed: u64) -> SearchRequest<'_> {
        SearchRequest {
            market: MarketId::new("EPL"),
            records,
            ranges: GeneRanges::betting_defaults(),
            mode,
            seed,
            reliability: Some(0.4),
            regime_split: 0.30,
            show_progress: false,
        }
    }

    fn history() -> Vec<MatchRecord> {
        let start = Utc.with_ymd_and_hms(2022, 8, 1, 15, 0, 0).unwrap();
        synthetic_history(&MarketId::new("EPL"), start, 240, 36, 11)
    }

    #[test]
    fn every_candidate_gene_stays_in_bounds() {
        let records = history();
        let arena = small_arena();
        for mode in [SearchMode::Quick, SearchMode::Deep] {
            let outcome = arena.search(&request(&records, mode, 5)).unwrap();
            for candidate in &outcome.population {
                assert!(candidate.dna.validate(&GeneRanges::betting_defaults()).is_ok());
            }
            assert!(outcome.front.iter().any(|c| c.id == outcome.champion.id));
        }
    }

    #[test]
    fn same_seed_same_outcome() {
        let records = history();
        let arena = small_arena();
        let a = arena.search(&request(&records, SearchMode::Quick, 99)).unwrap();
        let b = arena.search(&request(&records, SearchMode::Quick, 99)).unwrap();
        assert_eq!(a.champion, b.champion);
        assert_eq!(a.population, b.population);

        let c = arena.search(&request(&records, SearchMode::Quick, 100)).unwrap();
        assert_ne!(a.champion.id, c.champion.id);
    }

    #[test]
    fn validation_window_follows_training_window() {
        let records = history();
        let outcome = small_arena()
            .search(&request(&records, SearchMode::Quick, 1))
            .unwrap();
        assert!(outcome.validation_window.0 >= outcome.training_window.1);
        assert!(outcome.champion.validation.is_some());
    }

    #[test]
    fn tiny_history_is_rejected() {
        let records = history();
        let err = small_arena()
            .search(&request(&records[..1], SearchMode::Quick, 1))
            .unwrap_err();
        assert!(matches!(err, ArenaError::NotEnoughData(_)));
    }

    #[test]
    fn cv_objective_penalizes_fold_spread() {
        assert!((cv_objective(&[0.2, 0.2, 0.2]) - 0.2).abs() < 1e-12);
        assert!(cv_objective(&[0.0, 0.4]) < 0.2);
    }

    #[test]
    fn violations_scale_with_distance_from_constraints() {
        let constraints = SearchConstraints::default();
        let ok = FitnessTerms {
            bet_count: 40,
            max_drawdown: 0.1,
            ..Default::default()
        };
        assert_eq!(constraint_violation(&ok, &constraints), 0.0);
        let thin = FitnessTerms {
            bet_count: 10,
            max_drawdown: 0.7,
            ..Default::default()
        };
        assert!((constraint_violation(&thin, &constraints) - 1.5).abs() < 1e-12);
    }
}
