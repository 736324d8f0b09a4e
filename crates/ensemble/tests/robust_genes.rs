use arena::{ArenaError, CandidateSearch, SearchOutcome, SearchRequest};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use configuration::{EnsembleConfig, FitnessConfig};
use core_types::fixtures::synthetic_history;
use core_types::{
    Archetype, Candidate, Dna, FitnessTerms, GeneRanges, Lineage, MarketId, SearchMode,
    StrategyStatus,
};
use database::{MemoryRepository, StrategyStore};
use ensemble::{EnsembleError, EnsembleMiner, MiningRequest};
use promotion::PromotionManager;
use std::collections::HashSet;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A search whose champion always agrees on `min_edge` and draws `xg_weight`
/// from the seed.
struct ScriptedSearch;

impl CandidateSearch for ScriptedSearch {
    fn search(&self, request: &SearchRequest<'_>) -> Result<SearchOutcome, ArenaError> {
        let mut rng = StdRng::seed_from_u64(request.seed);
        let mut dna = Dna::uniform(request.ranges.midpoint_vector());
        dna.low_vol.set("min_edge", 0.05);
        dna.low_vol.set("xg_weight", rng.gen_range(0.0..1.0));

        let champion = Candidate {
            id: Candidate::derive_id(&request.market, request.seed, 3, 0),
            market: request.market.clone(),
            dna,
            lineage: Lineage {
                seed: request.seed,
                generation: 3,
                parents: Vec::new(),
            },
            training: FitnessTerms::default(),
            validation: Some(FitnessTerms {
                fitness: request.seed as f64,
                ..Default::default()
            }),
            objective: 0.0,
            stress: None,
        };
        let day = |d| NaiveDate::from_ymd_opt(2023, 1, d).unwrap_or_default();
        Ok(SearchOutcome {
            market: request.market.clone(),
            seed: request.seed,
            mode: request.mode,
            front: vec![champion.clone()],
            population: vec![champion.clone()],
            champion,
            training_window: (day(1), day(20)),
            validation_window: (day(21), day(31)),
            population_diversity: 0.0,
            linked_pairs: Vec::new(),
        })
    }
}

fn miner() -> EnsembleMiner<ScriptedSearch> {
    let config = EnsembleConfig {
        runs: 10,
        base_seed: 500,
        ..EnsembleConfig::default()
    };
    EnsembleMiner::new(ScriptedSearch, config, FitnessConfig::default(), 0.2)
}

#[test]
fn invariant_gene_is_robust_and_seeded_gene_is_unstable() {
    let market = MarketId::new("EPL");
    let start = Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap();
    let records = synthetic_history(&market, start, 120, 6, 3);

    let outcome = miner()
        .mine(&MiningRequest {
            market: market.clone(),
            records: &records,
            ranges: GeneRanges::betting_defaults(),
            mode: SearchMode::Quick,
            reliability: None,
            regime_split: 0.3,
            show_progress: false,
            now: start,
            cooldown_until: None,
        })
        .unwrap();

    assert_eq!(outcome.seeds, (500..510).collect::<Vec<u64>>());
    assert!(outcome.robust_genes.contains(&"lv.min_edge".to_string()));
    assert!(outcome.unstable_genes.contains(&"lv.xg_weight".to_string()));

    let g1 = outcome.gene_stats.iter().find(|s| s.gene == "lv.min_edge").unwrap();
    let g2 = outcome.gene_stats.iter().find(|s| s.gene == "lv.xg_weight").unwrap();
    assert!(g1.cv < 1e-9);
    assert!(g2.cv > 0.15);

    // The consensus keeps the agreed value and takes the unstable gene from
    // the best run (highest validation fitness, i.e. the last seed).
    let consensus = &outcome.archetypes[0];
    assert_eq!(consensus.archetype, Archetype::Consensus);
    assert_eq!(consensus.candidate.dna.low_vol.get("min_edge"), Some(0.05));
    let best = outcome.champions.last().unwrap();
    assert_eq!(
        consensus.candidate.dna.low_vol.get("xg_weight"),
        best.dna.low_vol.get("xg_weight")
    );

    let strategies = outcome.to_strategies(8, 0.2, start);
    assert_eq!(strategies.len(), outcome.archetypes.len());
    assert!(strategies.iter().all(|s| s.status() == StrategyStatus::Shadow));
    assert!(strategies.iter().all(|s| s.notes.ensemble_runs == Some(10)));
}

#[test]
fn cooldown_blocks_mining() {
    let market = MarketId::new("EPL");
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let err = miner()
        .mine(&MiningRequest {
            market,
            records: &[],
            ranges: GeneRanges::betting_defaults(),
            mode: SearchMode::Quick,
            reliability: None,
            regime_split: 0.3,
            show_progress: false,
            now,
            cooldown_until: Some(now + Duration::hours(10)),
        })
        .unwrap_err();
    assert!(matches!(err, EnsembleError::Cooldown { .. }));
}

#[tokio::test]
async fn repeated_sessions_append_to_the_strategy_history() {
    let market = MarketId::new("EPL");
    let repo = MemoryRepository::default();
    let manager = PromotionManager::default();
    let miner = miner();

    let mut sessions = Vec::new();
    for (round, data_seed) in [3_u64, 4].into_iter().enumerate() {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap() + Duration::days(30 * round as i64);
        let records = synthetic_history(&market, start, 120, 6, data_seed);
        let outcome = miner
            .mine(&MiningRequest {
                market: market.clone(),
                records: &records,
                ranges: GeneRanges::betting_defaults(),
                mode: SearchMode::Quick,
                reliability: None,
                regime_split: 0.3,
                show_progress: false,
                now: start,
                cooldown_until: None,
            })
            .unwrap();
        let strategies = outcome.to_strategies(8, 0.2, start);
        let registered = manager.register_shadows(&repo, &strategies).await.unwrap();
        assert_eq!(registered, strategies.len());
        sessions.push(strategies);
    }

    // Same seeds, same candidate identities; distinct persisted strategies.
    let consensus: Vec<_> = sessions.iter().map(|s| &s[0]).collect();
    assert_eq!(consensus[0].notes.candidate_id, consensus[1].notes.candidate_id);
    assert!(consensus[0].notes.candidate_id.is_some());
    assert_ne!(consensus[0].id, consensus[1].id);
    assert_eq!(consensus[0].stress_identity(), consensus[1].stress_identity());

    let stored = repo.strategies_for_market(&market).await.unwrap();
    let expected: usize = sessions.iter().map(Vec::len).sum();
    assert_eq!(stored.len(), expected);
    let ids: HashSet<_> = stored.iter().map(|s| s.id).collect();
    assert_eq!(ids.len(), expected);
}
