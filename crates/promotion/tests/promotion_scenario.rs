use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use configuration::{PolicyValues, PromotionConfig};
use core_types::{
    Dna, FitnessTerms, GeneRanges, Lifecycle, MarketId, OptimizationNotes, SearchMode, ShadowState,
    Strategy, StrategyStatus, StressResult, StressStage, TipOutcome, TransitionAudit,
    TransitionReason,
};
use database::{LifecycleChange, MemoryRepository, StoreError, StrategyStore};
use promotion::{PromotionBlocker, PromotionError, PromotionManager};
use uuid::Uuid;

fn at(hour: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
}

fn finalist_pass() -> StressResult {
    StressResult {
        stage: StressStage::Finalist,
        seed: 7,
        bootstrap_samples: 1000,
        paths: 500,
        prob_positive: 0.9,
        roi_mean: 0.07,
        roi_ci_low: 0.01,
        roi_ci_high: 0.12,
        ci_level: 0.95,
        ruin_probability: 0.01,
        drawdown_median: 0.1,
        drawdown_p95: 0.2,
        early_terminated_paths: 0,
        failures: Vec::new(),
        passed: true,
        rescue: None,
    }
}

fn shadow(market: &str, created: i64) -> Strategy {
    let window = (
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
    );
    Strategy {
        id: Uuid::new_v4(),
        market: MarketId::new(market),
        dna: Dna::uniform(GeneRanges::betting_defaults().midpoint_vector()),
        generation: 12,
        training: FitnessTerms::default(),
        validation: FitnessTerms {
            roi: 0.08,
            bet_count: 140,
            ..FitnessTerms::default()
        },
        stress: Some(finalist_pass()),
        archetype: None,
        notes: OptimizationNotes {
            seed: 42,
            mode: SearchMode::Deep,
            training_window: window,
            validation_window: window,
            lookback_years: 8,
            decay_floor: 0.2,
            population_diversity: 0.25,
            ensemble_runs: None,
            robust_genes: Vec::new(),
            unstable_genes: Vec::new(),
            candidate_id: None,
        },
        created_at: at(created),
        lifecycle: Lifecycle::Shadow(ShadowState::default()),
        version: 0,
    }
}

fn tip(hour: i64, expected: f64, realized: f64) -> TipOutcome {
    TipOutcome {
        settled_at: at(hour),
        stake: 1.0,
        expected_return: expected,
        realized_return: realized,
    }
}

async fn setup(strategies: &[Strategy]) -> (MemoryRepository, PromotionManager) {
    let repo = MemoryRepository::new(PolicyValues::default());
    let manager = PromotionManager::default();
    manager.register_shadows(&repo, strategies).await.unwrap();
    (repo, manager)
}

async fn shadow_tips(
    repo: &MemoryRepository,
    manager: &PromotionManager,
    id: Uuid,
    count: i64,
) {
    let policy = PolicyValues::default();
    for hour in 0..count {
        let recorded = manager
            .record_tip(repo, id, tip(hour, 0.06, 0.08), &policy, at(hour))
            .await
            .unwrap();
        assert_eq!(recorded.status, StrategyStatus::Shadow);
    }
}

#[tokio::test]
async fn sixty_good_shadow_tips_promote_with_one_audit() {
    let candidate = shadow("EPL", 0);
    let (repo, manager) = setup(std::slice::from_ref(&candidate)).await;
    shadow_tips(&repo, &manager, candidate.id, 60).await;

    let stored = repo.get_strategy(candidate.id).await.unwrap();
    assert_eq!(stored.version, 60);
    let Lifecycle::Shadow(state) = &stored.lifecycle else {
        panic!("expected shadow, got {:?}", stored.status());
    };
    assert_eq!(state.tips, 60);

    let audits = manager
        .promote(&repo, candidate.id, &PolicyValues::default(), "scheduler", at(100))
        .await
        .unwrap();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].reason, TransitionReason::GatedPromotion);
    assert_eq!(audits[0].from, StrategyStatus::Shadow);
    assert_eq!(audits[0].to, StrategyStatus::Active);

    let market = MarketId::new("EPL");
    assert_eq!(repo.audits(&market).await.unwrap().len(), 1);
    let active = repo.active_strategy(&market).await.unwrap().unwrap();
    assert_eq!(active.id, candidate.id);
}

#[tokio::test]
async fn too_few_tips_block_promotion_without_writing() {
    let candidate = shadow("EPL", 0);
    let (repo, manager) = setup(std::slice::from_ref(&candidate)).await;
    shadow_tips(&repo, &manager, candidate.id, 10).await;

    let err = manager
        .promote(&repo, candidate.id, &PolicyValues::default(), "scheduler", at(100))
        .await
        .unwrap_err();
    match err {
        PromotionError::Ineligible { blockers, .. } => {
            assert_eq!(
                blockers,
                vec![PromotionBlocker::TooFewTips {
                    tips: 10,
                    required: 50
                }]
            );
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(repo.audits(&MarketId::new("EPL")).await.unwrap().is_empty());
}

#[tokio::test]
async fn promotion_supersedes_the_current_active_strategy() {
    let first = shadow("EPL", 0);
    let second = shadow("EPL", 1);
    let (repo, manager) = setup(&[first.clone(), second.clone()]).await;
    shadow_tips(&repo, &manager, first.id, 50).await;
    shadow_tips(&repo, &manager, second.id, 50).await;

    let policy = PolicyValues::default();
    manager
        .promote(&repo, first.id, &policy, "scheduler", at(100))
        .await
        .unwrap();
    let audits = manager
        .promote(&repo, second.id, &policy, "scheduler", at(200))
        .await
        .unwrap();
    assert_eq!(audits.len(), 2);
    assert_eq!(audits[0].strategy_id, first.id);
    assert_eq!(audits[0].reason, TransitionReason::Superseded);
    assert_eq!(audits[1].strategy_id, second.id);

    let market = MarketId::new("EPL");
    let statuses: Vec<(Uuid, StrategyStatus)> = repo
        .strategies_for_market(&market)
        .await
        .unwrap()
        .iter()
        .map(|s| (s.id, s.status()))
        .collect();
    assert_eq!(
        statuses,
        vec![
            (first.id, StrategyStatus::Archived),
            (second.id, StrategyStatus::Active)
        ]
    );
    assert_eq!(repo.audits(&market).await.unwrap().len(), 3);
}

#[tokio::test]
async fn manual_activation_bypasses_metrics_but_not_the_state_machine() {
    let candidate = shadow("LIGA", 0);
    let (repo, manager) = setup(std::slice::from_ref(&candidate)).await;

    let audits = manager
        .activate_manual(&repo, candidate.id, "ops", "cup final cover", at(1))
        .await
        .unwrap();
    assert_eq!(audits[0].reason, TransitionReason::ManualActivation);
    assert!(audits[0].detail.contains("bypassed"));

    manager
        .archive(&repo, candidate.id, "ops", "done", at(2))
        .await
        .unwrap();
    let err = manager
        .activate_manual(&repo, candidate.id, "ops", "again", at(3))
        .await
        .unwrap_err();
    assert!(matches!(err, PromotionError::Lifecycle(_)));
}

#[tokio::test]
async fn drifting_live_tips_roll_back_and_start_a_cooldown() {
    let candidate = shadow("EPL", 0);
    let (repo, manager) = setup(std::slice::from_ref(&candidate)).await;
    manager
        .activate_manual(&repo, candidate.id, "ops", "bootstrap", at(1))
        .await
        .unwrap();

    let policy = PolicyValues::default();
    for hour in 0..29 {
        let recorded = manager
            .record_tip(&repo, candidate.id, tip(hour, 0.05, -1.0), &policy, at(hour))
            .await
            .unwrap();
        assert_eq!(recorded.status, StrategyStatus::Active);
        assert!(recorded.rollback.is_none());
    }

    let now = at(29);
    let recorded = manager
        .record_tip(&repo, candidate.id, tip(29, 0.05, -1.0), &policy, now)
        .await
        .unwrap();
    assert_eq!(recorded.status, StrategyStatus::Archived);
    let rollback = recorded.rollback.unwrap();
    assert_eq!(rollback.reason, TransitionReason::DriftRollback);

    let market = MarketId::new("EPL");
    assert!(repo.active_strategy(&market).await.unwrap().is_none());
    let cooldown = manager
        .retraining_cooldown(&repo, &market, now)
        .await
        .unwrap();
    assert_eq!(cooldown, Some(now + Duration::hours(72)));
    assert_eq!(
        manager
            .retraining_cooldown(&repo, &market, now + Duration::hours(73))
            .await
            .unwrap(),
        None
    );

    let err = manager
        .record_tip(&repo, candidate.id, tip(30, 0.05, 0.1), &policy, now)
        .await
        .unwrap_err();
    assert!(matches!(err, PromotionError::NotActive(_)));
}

#[tokio::test]
async fn drift_check_reads_without_rolling_back_a_short_window() {
    let candidate = shadow("EPL", 0);
    let (repo, manager) = setup(std::slice::from_ref(&candidate)).await;
    manager
        .activate_manual(&repo, candidate.id, "ops", "bootstrap", at(1))
        .await
        .unwrap();
    let policy = PolicyValues::default();
    manager
        .record_tip(&repo, candidate.id, tip(2, 0.05, -1.0), &policy, at(2))
        .await
        .unwrap();

    let (reading, rollback) = manager
        .drift_check(&repo, &MarketId::new("EPL"), &policy, at(3))
        .await
        .unwrap();
    assert_eq!(reading.unwrap().tips, 1);
    assert!(rollback.is_none());

    let tight = policy.with_value("DRIFT_WINDOW_TIPS", serde_json::json!(1)).unwrap();
    let (_, rollback) = manager
        .drift_check(&repo, &MarketId::new("EPL"), &tight, at(3))
        .await
        .unwrap();
    assert_eq!(rollback.unwrap().reason, TransitionReason::DriftRollback);
}

/// Reads from memory but loses every lifecycle write to a concurrent writer.
struct ContendedStore(MemoryRepository);

#[async_trait]
impl StrategyStore for ContendedStore {
    async fn insert_strategies(&self, strategies: &[Strategy]) -> Result<(), StoreError> {
        self.0.insert_strategies(strategies).await
    }

    async fn get_strategy(&self, id: Uuid) -> Result<Strategy, StoreError> {
        self.0.get_strategy(id).await
    }

    async fn strategies_for_market(&self, market: &MarketId) -> Result<Vec<Strategy>, StoreError> {
        self.0.strategies_for_market(market).await
    }

    async fn all_strategies(&self) -> Result<Vec<Strategy>, StoreError> {
        self.0.all_strategies().await
    }

    async fn active_strategy(&self, market: &MarketId) -> Result<Option<Strategy>, StoreError> {
        self.0.active_strategy(market).await
    }

    async fn apply_transitions(&self, changes: &[LifecycleChange]) -> Result<(), StoreError> {
        Err(StoreError::Conflict {
            strategy_id: changes[0].strategy.id,
            expected_version: changes[0].expected_version,
        })
    }

    async fn save_progress(&self, strategy: &Strategy, expected_version: i64) -> Result<(), StoreError> {
        self.0.save_progress(strategy, expected_version).await
    }

    async fn audits(&self, market: &MarketId) -> Result<Vec<TransitionAudit>, StoreError> {
        self.0.audits(market).await
    }
}

#[tokio::test]
async fn persistent_conflicts_surface_as_contention() {
    let candidate = shadow("EPL", 0);
    let (repo, _) = setup(std::slice::from_ref(&candidate)).await;
    let store = ContendedStore(repo);
    let manager = PromotionManager::new(PromotionConfig {
        conflict_attempts: 3,
    });

    let err = manager
        .activate_manual(&store, candidate.id, "ops", "contended", at(1))
        .await
        .unwrap_err();
    match err {
        PromotionError::Contention {
            strategy_id,
            attempts,
        } => {
            assert_eq!(strategy_id, candidate.id);
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        store.get_strategy(candidate.id).await.unwrap().status(),
        StrategyStatus::Shadow
    );
}
