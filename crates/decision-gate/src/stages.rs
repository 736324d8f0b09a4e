//! The six gate stages. Each is a pure function of its inputs and returns the
//! `StageRecord` that goes into the trace.

use crate::AuxInference;
use chrono::{DateTime, Utc};
use configuration::{ConservationMode, PolicyValues, SanityAction, StageMode};
use core_types::{
    CalibrationSnapshot, GateStage, InferenceStatus, MarketOverride, MatchRecord, OutcomeTriple,
    ReasonCode, SanityField, StageMetrics, StageRecord, StageVerdict, Strategy,
};
use strategies::{BetDecision, BetRule, BetSelection, DnaRules, PassReason};

fn record(stage: GateStage, verdict: StageVerdict, metrics: StageMetrics) -> StageRecord {
    StageRecord {
        stage,
        verdict,
        metrics,
    }
}

/// Blocks on the first code under fail-closed, warns with all of them under
/// fail-open.
fn apply_mode(mode: StageMode, codes: Vec<ReasonCode>) -> StageVerdict {
    match (codes.first(), mode) {
        (None, _) => StageVerdict::Passed,
        (Some(&first), StageMode::FailClosed) => StageVerdict::Blocked(first),
        (Some(_), StageMode::FailOpen) => StageVerdict::Warned(codes),
    }
}

fn in_unit_range(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

/// Out-of-bounds modeled quantities of one match.
pub fn sanity_violations(context: &MatchRecord, policy: &PolicyValues) -> Vec<SanityField> {
    let xg_ok = |xg: f64| xg.is_finite() && xg >= 0.0 && xg <= policy.max_xg_per_team;
    let odds_ok = |o: f64| o.is_finite() && o >= policy.min_sane_odds && o <= policy.max_sane_odds;
    let probs = context.model_probs;
    let odds = context.odds;

    let mut violations = Vec::new();
    if !xg_ok(context.xg_home) {
        violations.push(SanityField::XgHome);
    }
    if !xg_ok(context.xg_away) {
        violations.push(SanityField::XgAway);
    }
    if ![odds.home, odds.draw, odds.away].into_iter().all(odds_ok) {
        violations.push(SanityField::Odds);
    }
    if ![probs.home, probs.draw, probs.away].into_iter().all(in_unit_range) {
        violations.push(SanityField::Probability);
    }
    if !in_unit_range(context.confidence) {
        violations.push(SanityField::Confidence);
    }
    violations
}

/// Result of the conservation guard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Conservation {
    Conserved,
    Renormalized(OutcomeTriple),
    Violated,
}

/// Checks that the model probabilities sum to one within tolerance and, when
/// policy allows, rescales them. A renormalized triple always satisfies the
/// tolerance.
pub fn conserve(probs: OutcomeTriple, policy: &PolicyValues) -> Conservation {
    let within = |p: &OutcomeTriple| (p.sum() - 1.0).abs() <= policy.probability_tolerance;
    if within(&probs) {
        return Conservation::Conserved;
    }
    match policy.probability_conservation {
        ConservationMode::FailClosed => Conservation::Violated,
        ConservationMode::Renormalize => match probs.normalized() {
            Some(scaled) if within(&scaled) => Conservation::Renormalized(scaled),
            _ => Conservation::Violated,
        },
    }
}

/// Stage 1. Returns the record plus the context later stages should see,
/// which differs from the input only when probabilities were renormalized.
pub fn input_sanity(context: &MatchRecord, policy: &PolicyValues) -> (StageRecord, MatchRecord) {
    let violations = sanity_violations(context, policy);
    let mut warnings = Vec::new();
    let mut blocked = None;
    if !violations.is_empty() {
        match policy.sanity_action {
            SanityAction::Block => blocked = Some(ReasonCode::SanityViolation),
            SanityAction::Quarantine => blocked = Some(ReasonCode::SanityQuarantined),
            SanityAction::AllowWithWarning => warnings.push(ReasonCode::SanityWarning),
        }
    }

    let mut checked = context.clone();
    let mut renormalized = false;
    if blocked.is_none() {
        match conserve(context.model_probs, policy) {
            Conservation::Conserved => {}
            Conservation::Renormalized(scaled) => {
                checked.model_probs = scaled;
                renormalized = true;
                warnings.push(ReasonCode::ProbabilitiesRenormalized);
            }
            Conservation::Violated => blocked = Some(ReasonCode::ProbabilityConservationViolation),
        }
    }

    let verdict = match blocked {
        Some(code) => StageVerdict::Blocked(code),
        None if warnings.is_empty() => StageVerdict::Passed,
        None => StageVerdict::Warned(warnings),
    };
    let metrics = StageMetrics::InputSanity {
        xg_home: context.xg_home,
        xg_away: context.xg_away,
        max_xg_per_team: policy.max_xg_per_team,
        probability_sum: checked.model_probs.sum(),
        renormalized,
        violations,
    };
    (record(GateStage::InputSanity, verdict, metrics), checked)
}

/// Stage 2. An active suppression window always blocks.
pub fn manual_override(
    market_override: Option<&MarketOverride>,
    decided_at: DateTime<Utc>,
) -> StageRecord {
    let active = market_override.filter(|o| o.is_active(decided_at));
    let verdict = match active {
        Some(_) => StageVerdict::Blocked(ReasonCode::MarketSuppressed),
        None => StageVerdict::Passed,
    };
    let metrics = StageMetrics::ManualOverride {
        suppressed_until: active.map(|o| o.ends_at),
    };
    record(GateStage::ManualOverride, verdict, metrics)
}

/// Stage 3. The justice floor is checked against the reliability score of the
/// market's calibration snapshot.
pub fn core_risk(
    context: &MatchRecord,
    calibration: Option<&CalibrationSnapshot>,
    policy: &PolicyValues,
) -> StageRecord {
    let calibration_score = calibration.map(|c| c.reliability_score);
    let mut codes = Vec::new();
    match calibration_score {
        None => codes.push(ReasonCode::CalibrationUnavailable),
        Some(score) if score < policy.justice_floor => codes.push(ReasonCode::JusticeFloorBreached),
        Some(_) => {}
    }
    if !(context.data_quality >= policy.data_quality_floor) {
        codes.push(ReasonCode::DataQualityFloorBreached);
    }

    let metrics = StageMetrics::CoreRisk {
        calibration_score,
        justice_floor: policy.justice_floor,
        data_quality: context.data_quality,
        data_quality_floor: policy.data_quality_floor,
    };
    record(GateStage::CoreRisk, apply_mode(policy.core_risk_mode, codes), metrics)
}

/// Stage 4.
pub fn auxiliary_signals(
    context: &MatchRecord,
    inference: AuxInference,
    policy: &PolicyValues,
) -> StageRecord {
    let mut codes = Vec::new();
    match inference {
        AuxInference::Answered(drift) if drift.abs() > policy.inference_drift_ceiling => {
            codes.push(ReasonCode::MarketInferenceDrift)
        }
        AuxInference::Answered(_) => {}
        AuxInference::TimedOut | AuxInference::Unavailable => {
            codes.push(ReasonCode::MarketInferenceUnavailable)
        }
    }
    if !context.sentiment_available {
        codes.push(ReasonCode::SentimentUnavailable);
    }

    let metrics = StageMetrics::AuxiliarySignals {
        inference_status: inference.status(),
        inference_drift: inference.drift(),
        drift_ceiling: policy.inference_drift_ceiling,
        sentiment_available: context.sentiment_available,
    };
    record(
        GateStage::AuxiliarySignals,
        apply_mode(policy.aux_signal_mode, codes),
        metrics,
    )
}

/// Stage 5. Yields below the confidence floor, applies the strategy, and
/// rejects implausible recommendations. A strategy that cannot be applied
/// arrives as the reason code it blocks with. Returns the selection when one
/// survives.
pub fn guardrails(
    context: &MatchRecord,
    strategy: Option<&Strategy>,
    rules: Result<Option<&DnaRules>, ReasonCode>,
    policy: &PolicyValues,
) -> (StageRecord, Option<BetSelection>) {
    let metrics = |selection: Option<&BetSelection>| StageMetrics::Guardrails {
        confidence: context.confidence,
        confidence_floor: policy.confidence_floor,
        edge: selection.map(|s| s.edge),
        stake: selection.map(|s| s.stake_fraction),
        odds: selection.map(|s| s.odds),
    };
    let blocked = |code: ReasonCode, selection: Option<&BetSelection>| {
        record(GateStage::Guardrails, StageVerdict::Blocked(code), metrics(selection))
    };

    if context.confidence < policy.confidence_floor {
        return (blocked(ReasonCode::ConfidenceBelowFloor, None), None);
    }
    let rules = match rules {
        Ok(rules) => rules,
        Err(code) => return (blocked(code, None), None),
    };
    let (Some(_), Some(rules)) = (strategy, rules) else {
        return (blocked(ReasonCode::NoActiveStrategy, None), None);
    };

    let selection = match rules.evaluate(context) {
        BetDecision::Bet(selection) => selection,
        BetDecision::Pass(PassReason::BelowConfidence) => {
            return (blocked(ReasonCode::ConfidenceBelowFloor, None), None);
        }
        BetDecision::Pass(PassReason::NoEdge) => {
            return (blocked(ReasonCode::NoEdge, None), None);
        }
    };

    let implausible = selection.odds > policy.max_plausible_odds
        || selection.edge > policy.max_plausible_edge
        || selection.stake_fraction > policy.max_plausible_stake;
    if implausible {
        return (
            blocked(ReasonCode::ImplausibleRecommendation, Some(&selection)),
            None,
        );
    }
    (
        record(GateStage::Guardrails, StageVerdict::Passed, metrics(Some(&selection))),
        Some(selection),
    )
}

/// Stage 6. A signal is only emitted when every field needed to justify it is
/// present and finite.
pub fn emission(
    context: &MatchRecord,
    strategy: Option<&Strategy>,
    selection: Option<&BetSelection>,
) -> StageRecord {
    let mut missing = Vec::new();
    if context.match_id.trim().is_empty() {
        missing.push("match_id".to_string());
    }
    if strategy.is_none() {
        missing.push("strategy_id".to_string());
    }
    match selection {
        None => missing.push("selection".to_string()),
        Some(s) => {
            for (name, value) in [
                ("odds", s.odds),
                ("probability", s.probability),
                ("edge", s.edge),
                ("stake_fraction", s.stake_fraction),
            ] {
                if !value.is_finite() {
                    missing.push(name.to_string());
                }
            }
        }
    }

    let verdict = if missing.is_empty() {
        StageVerdict::Passed
    } else {
        StageVerdict::Blocked(ReasonCode::IncompleteJustification)
    };
    record(
        GateStage::Emission,
        verdict,
        StageMetrics::Emission {
            missing_fields: missing,
        },
    )
}
