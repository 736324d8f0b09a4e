use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use configuration::{PolicySnapshot, PolicyValues};
use core_types::{
    Cadence, CalibrationSnapshot, DecisionOutcome, DecisionPath, DecisionTrace, Dna, FitnessTerms,
    GateStage, GeneRanges, Lifecycle, MarketId, MarketOverride, MatchRecord, OptimizationNotes,
    Outcome, OutcomeTriple, ReasonCode, SearchMode, ShadowState, SnapshotOrigin, SnapshotSource,
    StageMetrics, StageVerdict, Strategy,
};
use decision_gate::{AuxInference, DecisionGate, GateInput, StagedGate};
use serde_json::json;
use uuid::Uuid;

fn kickoff() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 4, 15, 0, 0).unwrap()
}

fn context() -> MatchRecord {
    MatchRecord {
        match_id: "EPL-2024-0504-ARS-BOU".to_string(),
        market: MarketId::new("EPL"),
        kickoff: kickoff(),
        odds: OutcomeTriple::new(2.2, 3.4, 3.6),
        model_probs: OutcomeTriple::new(0.50, 0.25, 0.25),
        xg_home: 1.2,
        xg_away: 1.2,
        confidence: 0.8,
        data_quality: 0.9,
        liquidity: Some(0.03),
        market_drift: Some(0.01),
        sentiment_available: true,
        result: None,
    }
}

fn strategy() -> Strategy {
    let mut vector = GeneRanges::betting_defaults().midpoint_vector();
    vector.set("min_edge", 0.02);
    vector.set("min_odds", 1.5);
    vector.set("max_odds", 6.0);
    vector.set("kelly_fraction", 0.25);
    vector.set("max_stake", 0.03);
    vector.set("min_confidence", 0.5);
    vector.set("draw_penalty", 0.0);
    vector.set("xg_weight", 0.0);
    let window = (
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
    );
    Strategy {
        id: Uuid::new_v4(),
        market: MarketId::new("EPL"),
        dna: Dna::uniform(vector),
        generation: 20,
        training: FitnessTerms::default(),
        validation: FitnessTerms::default(),
        stress: None,
        archetype: None,
        notes: OptimizationNotes {
            seed: 42,
            mode: SearchMode::Quick,
            training_window: window,
            validation_window: window,
            lookback_years: 8,
            decay_floor: 0.2,
            population_diversity: 0.3,
            ensemble_runs: None,
            robust_genes: Vec::new(),
            unstable_genes: Vec::new(),
            candidate_id: None,
        },
        created_at: kickoff() - Duration::days(30),
        lifecycle: Lifecycle::Shadow(ShadowState::default()),
        version: 0,
    }
}

fn calibration(reliability: f64) -> CalibrationSnapshot {
    let anchor = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    CalibrationSnapshot {
        id: Uuid::new_v4(),
        market: MarketId::new("EPL"),
        anchor,
        window_start: NaiveDate::from_ymd_opt(2022, 5, 1).unwrap(),
        window_end: anchor,
        source: SnapshotSource::Retroactive,
        origin: SnapshotOrigin::Direct,
        cadence: Cadence::Monthly,
        script_version: "tm-2".to_string(),
        sample_count: 600,
        weighted_samples: 410.0,
        ece: Some(1.0 - reliability),
        brier: Some(0.19),
        reliability_score: reliability,
        buckets: Vec::new(),
        computed_at: kickoff(),
    }
}

struct Case {
    context: MatchRecord,
    strategy: Option<Strategy>,
    policy: PolicySnapshot,
    calibration: Option<CalibrationSnapshot>,
    market_override: Option<MarketOverride>,
    inference: AuxInference,
}

impl Case {
    fn new() -> Self {
        let context = context();
        Self {
            inference: AuxInference::from_record(&context),
            context,
            strategy: Some(strategy()),
            policy: PolicySnapshot::new(7, PolicyValues::default()),
            calibration: Some(calibration(0.9)),
            market_override: None,
        }
    }

    fn policy(mut self, key: &str, value: serde_json::Value) -> Self {
        self.policy.values = self.policy.values.with_value(key, value).unwrap();
        self
    }

    fn run_on(&self, path: DecisionPath) -> DecisionTrace {
        StagedGate::new()
            .evaluate(&GateInput {
                context: &self.context,
                strategy: self.strategy.as_ref(),
                policy: &self.policy,
                calibration: self.calibration.as_ref(),
                market_override: self.market_override.as_ref(),
                inference: self.inference,
                path,
                decided_at: kickoff() - Duration::hours(2),
            })
    }

    fn run(&self) -> DecisionTrace {
        self.run_on(DecisionPath::Live)
    }
}

fn assert_blocked(trace: &DecisionTrace, reason: ReasonCode, stage: GateStage) {
    assert_eq!(trace.outcome, DecisionOutcome::NoSignal { reason, stage });
    let last = trace.stages.last().unwrap();
    assert_eq!(last.stage, stage);
    assert_eq!(last.verdict, StageVerdict::Blocked(reason));
}

#[test]
fn clean_context_emits_a_fully_traced_signal() {
    let trace = Case::new().run();
    let DecisionOutcome::Signal(signal) = &trace.outcome else {
        panic!("expected a signal, got {:?}", trace.outcome);
    };
    assert_eq!(signal.selection, Outcome::Home);
    assert!((signal.edge - 0.10).abs() < 1e-9);
    assert_eq!(trace.policy_version, 7);
    assert_eq!(trace.stages.len(), 6);
    assert!(trace.warnings.is_empty());
    assert_eq!(trace.reason_codes(), vec![ReasonCode::SignalEmitted]);
}

#[test]
fn excessive_xg_is_a_sanity_violation() {
    let mut case = Case::new();
    case.context.xg_home = 9.5;
    let trace = case.run();
    assert_blocked(&trace, ReasonCode::SanityViolation, GateStage::InputSanity);
    assert_eq!(trace.stages.len(), 1);
    let StageMetrics::InputSanity {
        xg_home,
        max_xg_per_team,
        violations,
        ..
    } = &trace.stages[0].metrics
    else {
        panic!("sanity metrics missing");
    };
    assert_eq!(*xg_home, 9.5);
    assert_eq!(*max_xg_per_team, 8.0);
    assert_eq!(violations.len(), 1);
}

#[test]
fn sanity_action_is_policy_selectable() {
    let mut case = Case::new().policy("SANITY_ACTION", json!("quarantine"));
    case.context.xg_home = 9.5;
    assert_blocked(&case.run(), ReasonCode::SanityQuarantined, GateStage::InputSanity);

    let mut case = Case::new().policy("SANITY_ACTION", json!("allow_with_warning"));
    case.context.xg_home = 9.5;
    let trace = case.run();
    assert!(trace.outcome.is_signal());
    assert_eq!(trace.warnings, vec![ReasonCode::SanityWarning]);
}

#[test]
fn unconserved_probabilities_fail_closed_unless_renormalization_is_allowed() {
    let mut case = Case::new();
    case.context.model_probs = OutcomeTriple::new(0.52, 0.26, 0.26);
    assert_blocked(
        &case.run(),
        ReasonCode::ProbabilityConservationViolation,
        GateStage::InputSanity,
    );

    let mut case = Case::new().policy("PROBABILITY_CONSERVATION", json!("renormalize"));
    case.context.model_probs = OutcomeTriple::new(0.52, 0.26, 0.26);
    let trace = case.run();
    assert!(trace.outcome.is_signal());
    assert_eq!(trace.warnings, vec![ReasonCode::ProbabilitiesRenormalized]);
    let StageMetrics::InputSanity {
        probability_sum,
        renormalized,
        ..
    } = trace.stages[0].metrics
    else {
        panic!("sanity metrics missing");
    };
    assert!(renormalized);
    assert!((probability_sum - 1.0).abs() <= 1e-6);
}

#[test]
fn active_override_suppresses_the_market() {
    let mut case = Case::new();
    let decided_at = kickoff() - Duration::hours(2);
    case.market_override = Some(MarketOverride {
        id: Uuid::new_v4(),
        market: MarketId::new("EPL"),
        starts_at: decided_at - Duration::hours(1),
        ends_at: decided_at + Duration::hours(6),
        reason: "integrity alert".to_string(),
        actor: "ops".to_string(),
    });
    let trace = case.run();
    assert_blocked(&trace, ReasonCode::MarketSuppressed, GateStage::ManualOverride);

    if let Some(o) = case.market_override.as_mut() {
        o.ends_at = decided_at - Duration::minutes(1);
    }
    assert!(case.run().outcome.is_signal());
}

#[test]
fn core_risk_fails_closed_by_default() {
    let mut case = Case::new();
    case.calibration = None;
    assert_blocked(&case.run(), ReasonCode::CalibrationUnavailable, GateStage::CoreRisk);

    let mut case = Case::new();
    case.calibration = Some(calibration(0.4));
    assert_blocked(&case.run(), ReasonCode::JusticeFloorBreached, GateStage::CoreRisk);

    let mut case = Case::new();
    case.context.data_quality = 0.3;
    assert_blocked(&case.run(), ReasonCode::DataQualityFloorBreached, GateStage::CoreRisk);

    let mut case = Case::new().policy("CORE_RISK_MODE", json!("fail_open"));
    case.calibration = None;
    let trace = case.run();
    assert!(trace.outcome.is_signal());
    assert_eq!(trace.warnings, vec![ReasonCode::CalibrationUnavailable]);
}

#[test]
fn auxiliary_signals_fail_open_by_default() {
    let mut case = Case::new();
    case.inference = AuxInference::TimedOut;
    case.context.sentiment_available = false;
    let trace = case.run();
    assert!(trace.outcome.is_signal());
    assert_eq!(
        trace.warnings,
        vec![ReasonCode::MarketInferenceUnavailable, ReasonCode::SentimentUnavailable]
    );
    assert_eq!(
        trace.reason_codes().last(),
        Some(&ReasonCode::SignalEmitted)
    );

    let mut case = Case::new().policy("AUX_SIGNAL_MODE", json!("fail_closed"));
    case.inference = AuxInference::Answered(0.4);
    assert_blocked(
        &case.run(),
        ReasonCode::MarketInferenceDrift,
        GateStage::AuxiliarySignals,
    );
}

#[test]
fn low_confidence_yields_with_its_own_reason() {
    let mut case = Case::new();
    case.context.confidence = 0.4;
    let trace = case.run();
    assert_blocked(&trace, ReasonCode::ConfidenceBelowFloor, GateStage::Guardrails);
    assert!(!trace.reason_codes().contains(&ReasonCode::SanityViolation));
}

#[test]
fn implausible_recommendations_are_rejected() {
    let case = Case::new().policy("MAX_PLAUSIBLE_EDGE", json!(0.05));
    let trace = case.run();
    assert_blocked(&trace, ReasonCode::ImplausibleRecommendation, GateStage::Guardrails);
    let StageMetrics::Guardrails { edge, .. } = trace.stages.last().unwrap().metrics else {
        panic!("guardrail metrics missing");
    };
    assert!(edge.is_some());
}

#[test]
fn no_strategy_and_no_edge_are_documented() {
    let mut case = Case::new();
    case.strategy = None;
    let trace = case.run();
    assert_blocked(&trace, ReasonCode::NoActiveStrategy, GateStage::Guardrails);
    assert_eq!(trace.strategy_id, None);

    let mut case = Case::new();
    case.context.model_probs = OutcomeTriple::new(0.45, 0.28, 0.27);
    assert_blocked(&case.run(), ReasonCode::NoEdge, GateStage::Guardrails);
}

#[test]
fn live_and_replay_paths_agree() {
    let mut cases = vec![Case::new()];
    let mut sanity = Case::new();
    sanity.context.xg_away = 9.5;
    cases.push(sanity);
    let mut aux = Case::new();
    aux.inference = AuxInference::Unavailable;
    cases.push(aux);

    for case in &cases {
        let live = case.run_on(DecisionPath::Live);
        let replay = case.run_on(DecisionPath::Replay);
        assert_eq!(live.outcome, replay.outcome);
        assert_eq!(live.reason_codes(), replay.reason_codes());
        assert_eq!(live.stages, replay.stages);
        assert_eq!(live.path, DecisionPath::Live);
        assert_eq!(replay.path, DecisionPath::Replay);
    }
}

#[test]
fn strategy_of_another_market_blocks_with_a_trace() {
    let mut case = Case::new();
    case.context.market = MarketId::new("LIGA");
    let trace = case.run();
    assert_blocked(&trace, ReasonCode::StrategyMarketMismatch, GateStage::Guardrails);
    assert_eq!(trace.market, MarketId::new("LIGA"));
    assert_eq!(trace.strategy_id, case.strategy.as_ref().map(|s| s.id));
}

#[test]
fn strategy_missing_a_gene_blocks_with_a_trace() {
    let mut case = Case::new();
    if let Some(strategy) = case.strategy.as_mut() {
        strategy.dna.low_vol.0.remove("kelly_fraction");
    }
    let trace = case.run();
    assert_blocked(&trace, ReasonCode::InvalidStrategy, GateStage::Guardrails);
    assert_eq!(trace.policy_version, 7);
    assert_eq!(trace.stages.len(), 5);

    let replay = case.run_on(DecisionPath::Replay);
    assert_eq!(replay.outcome, trace.outcome);
}
