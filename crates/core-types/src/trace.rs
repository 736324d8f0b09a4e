//! The decision trace: a fixed-schema, privacy-safe record of one
//! signal/no-signal computation.
//!
//! Every condition a programmatic consumer may need to react to is a
//! [`ReasonCode`]. Stage metrics are tagged per stage so the fields required
//! to justify a decision are checked by the compiler rather than by
//! convention.

use crate::enums::{DecisionPath, Outcome, VolatilityRegime};
use crate::genes::MarketId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The canonical vocabulary of gate conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    SignalEmitted,

    // Input sanity
    SanityViolation,
    SanityQuarantined,
    SanityWarning,
    ProbabilityConservationViolation,
    ProbabilitiesRenormalized,

    // Manual override
    MarketSuppressed,

    // Core risk
    JusticeFloorBreached,
    CalibrationUnavailable,
    DataQualityFloorBreached,

    // Auxiliary signals
    MarketInferenceDrift,
    MarketInferenceUnavailable,
    SentimentUnavailable,

    // Guardrails
    ConfidenceBelowFloor,
    NoEdge,
    ImplausibleRecommendation,
    InvalidStrategy,
    StrategyMarketMismatch,

    // Emission
    IncompleteJustification,
    NoActiveStrategy,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::SignalEmitted => "signal_emitted",
            ReasonCode::SanityViolation => "sanity_violation",
            ReasonCode::SanityQuarantined => "sanity_quarantined",
            ReasonCode::SanityWarning => "sanity_warning",
            ReasonCode::ProbabilityConservationViolation => "probability_conservation_violation",
            ReasonCode::ProbabilitiesRenormalized => "probabilities_renormalized",
            ReasonCode::MarketSuppressed => "market_suppressed",
            ReasonCode::JusticeFloorBreached => "justice_floor_breached",
            ReasonCode::CalibrationUnavailable => "calibration_unavailable",
            ReasonCode::DataQualityFloorBreached => "data_quality_floor_breached",
            ReasonCode::MarketInferenceDrift => "market_inference_drift",
            ReasonCode::MarketInferenceUnavailable => "market_inference_unavailable",
            ReasonCode::SentimentUnavailable => "sentiment_unavailable",
            ReasonCode::ConfidenceBelowFloor => "confidence_below_floor",
            ReasonCode::NoEdge => "no_edge",
            ReasonCode::ImplausibleRecommendation => "implausible_recommendation",
            ReasonCode::InvalidStrategy => "invalid_strategy",
            ReasonCode::StrategyMarketMismatch => "strategy_market_mismatch",
            ReasonCode::IncompleteJustification => "incomplete_justification",
            ReasonCode::NoActiveStrategy => "no_active_strategy",
        }
    }
}

/// The ordered stages of the shared decision gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStage {
    InputSanity,
    ManualOverride,
    CoreRisk,
    AuxiliarySignals,
    Guardrails,
    Emission,
}

/// Modeled quantities the sanity stage bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanityField {
    XgHome,
    XgAway,
    Odds,
    Probability,
    Confidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceStatus {
    Answered,
    TimedOut,
    Unavailable,
}

/// Metrics captured by each stage, one fixed shape per stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageMetrics {
    InputSanity {
        xg_home: f64,
        xg_away: f64,
        max_xg_per_team: f64,
        probability_sum: f64,
        renormalized: bool,
        violations: Vec<SanityField>,
    },
    ManualOverride {
        suppressed_until: Option<DateTime<Utc>>,
    },
    CoreRisk {
        calibration_score: Option<f64>,
        justice_floor: f64,
        data_quality: f64,
        data_quality_floor: f64,
    },
    AuxiliarySignals {
        inference_status: InferenceStatus,
        inference_drift: Option<f64>,
        drift_ceiling: f64,
        sentiment_available: bool,
    },
    Guardrails {
        confidence: f64,
        confidence_floor: f64,
        edge: Option<f64>,
        stake: Option<f64>,
        odds: Option<f64>,
    },
    Emission {
        missing_fields: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "codes", rename_all = "snake_case")]
pub enum StageVerdict {
    Passed,
    Warned(Vec<ReasonCode>),
    Blocked(ReasonCode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: GateStage,
    pub verdict: StageVerdict,
    pub metrics: StageMetrics,
}

/// An emitted recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPayload {
    pub selection: Outcome,
    pub odds: f64,
    pub probability: f64,
    pub edge: f64,
    pub stake_fraction: f64,
    pub regime: VolatilityRegime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionOutcome {
    Signal(SignalPayload),
    NoSignal { reason: ReasonCode, stage: GateStage },
}

impl DecisionOutcome {
    pub fn reason(&self) -> ReasonCode {
        match self {
            DecisionOutcome::Signal(_) => ReasonCode::SignalEmitted,
            DecisionOutcome::NoSignal { reason, .. } => *reason,
        }
    }

    pub fn is_signal(&self) -> bool {
        matches!(self, DecisionOutcome::Signal(_))
    }
}

/// Full record of one decision. Contains no end-user identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTrace {
    pub trace_id: Uuid,
    pub market: MarketId,
    pub match_id: String,
    pub strategy_id: Option<Uuid>,
    pub policy_version: u64,
    pub path: DecisionPath,
    pub decided_at: DateTime<Utc>,
    pub stages: Vec<StageRecord>,
    pub warnings: Vec<ReasonCode>,
    pub outcome: DecisionOutcome,
}

impl DecisionTrace {
    /// Every code the decision produced: warnings in stage order, then the
    /// terminal reason.
    pub fn reason_codes(&self) -> Vec<ReasonCode> {
        let mut codes = self.warnings.clone();
        codes.push(self.outcome.reason());
        codes
    }

    pub fn stage(&self, stage: GateStage) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}
