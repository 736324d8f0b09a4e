//! # Oddsmith Decision Gate
//!
//! The single code path that turns a match context and the market's active
//! strategy into a signal or a documented no-signal. Live emission and
//! backtest replay both call it, so the same inputs always produce the same
//! outcome and the same reason codes.
//!
//! ## Architectural Principles
//!
//! - **Strict Order:** Input sanity, manual override, core risk, auxiliary
//!   signals, guardrails, emission. A blocking stage short-circuits the rest.
//! - **Policy Driven:** Every threshold and every fail-open/fail-closed mode
//!   comes from the `PolicySnapshot` passed in. It is read once and recorded
//!   in the trace by version.
//! - **No Blocking:** Evaluation is synchronous and does no I/O. Lookups with
//!   external latency are resolved by the caller into an `AuxInference`
//!   before the gate runs.
//!
//! ## Public API
//!
//! - `DecisionGate`: The trait live and replay callers hold.
//! - `StagedGate`: The six-stage implementation.
//! - `GateInput`: Everything one decision reads.

pub mod stages;

use chrono::{DateTime, Utc};
use configuration::PolicySnapshot;
use core_types::{
    CalibrationSnapshot, DecisionOutcome, DecisionPath, DecisionTrace, GateStage, InferenceStatus,
    MarketOverride, MatchRecord, ReasonCode, SignalPayload, StageRecord, StageVerdict, Strategy,
};
use serde::{Deserialize, Serialize};
use strategies::DnaRules;
use tracing::{debug, warn};
use uuid::Uuid;

/// The market-inference reading for one decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "drift", rename_all = "snake_case")]
pub enum AuxInference {
    Answered(f64),
    TimedOut,
    Unavailable,
}

impl AuxInference {
    /// The reading carried on a normalized match record.
    pub fn from_record(record: &MatchRecord) -> Self {
        match record.market_drift {
            Some(drift) => AuxInference::Answered(drift),
            None => AuxInference::Unavailable,
        }
    }

    pub fn status(&self) -> InferenceStatus {
        match self {
            AuxInference::Answered(_) => InferenceStatus::Answered,
            AuxInference::TimedOut => InferenceStatus::TimedOut,
            AuxInference::Unavailable => InferenceStatus::Unavailable,
        }
    }

    pub fn drift(&self) -> Option<f64> {
        match self {
            AuxInference::Answered(drift) => Some(*drift),
            _ => None,
        }
    }
}

/// Everything one decision reads. Nothing else is consulted.
#[derive(Debug, Clone, Copy)]
pub struct GateInput<'a> {
    pub context: &'a MatchRecord,
    /// The market's active strategy, or the strategy under replay.
    pub strategy: Option<&'a Strategy>,
    pub policy: &'a PolicySnapshot,
    pub calibration: Option<&'a CalibrationSnapshot>,
    pub market_override: Option<&'a MarketOverride>,
    pub inference: AuxInference,
    pub path: DecisionPath,
    pub decided_at: DateTime<Utc>,
}

/// The interface shared by live emission and backtest replay.
///
/// The `Send + Sync` bounds let one gate serve concurrent live decisions.
pub trait DecisionGate: Send + Sync {
    /// Always produces a trace: a signal or a no-signal with its reason.
    fn evaluate(&self, input: &GateInput<'_>) -> DecisionTrace;
}

/// The six-stage gate.
#[derive(Debug, Clone, Copy, Default)]
pub struct StagedGate;

impl StagedGate {
    pub fn new() -> Self {
        Self
    }
}

/// Accumulates stage records until one blocks.
struct TraceBuilder {
    stages: Vec<StageRecord>,
    warnings: Vec<ReasonCode>,
}

impl TraceBuilder {
    /// Records a stage. Returns the blocking code if the stage blocked.
    fn push(&mut self, record: StageRecord) -> Option<(ReasonCode, GateStage)> {
        let outcome = match &record.verdict {
            StageVerdict::Passed => None,
            StageVerdict::Warned(codes) => {
                self.warnings.extend(codes.iter().copied());
                None
            }
            StageVerdict::Blocked(code) => Some((*code, record.stage)),
        };
        self.stages.push(record);
        outcome
    }
}

impl DecisionGate for StagedGate {
    fn evaluate(&self, input: &GateInput<'_>) -> DecisionTrace {
        let context = input.context;
        let policy = &input.policy.values;

        // A strategy that cannot be applied blocks at the guardrails.
        let rules = match input.strategy {
            None => Ok(None),
            Some(strategy) if strategy.market != context.market => {
                warn!(
                    strategy_id = %strategy.id,
                    strategy_market = %strategy.market,
                    market = %context.market,
                    match_id = %context.match_id,
                    "Strategy belongs to another market"
                );
                Err(ReasonCode::StrategyMarketMismatch)
            }
            Some(strategy) => DnaRules::new(&strategy.dna, policy.regime_split)
                .map(Some)
                .map_err(|error| {
                    warn!(strategy_id = %strategy.id, %error, "Strategy DNA cannot be applied");
                    ReasonCode::InvalidStrategy
                }),
        };

        let mut builder = TraceBuilder {
            stages: Vec::with_capacity(6),
            warnings: Vec::new(),
        };
        let outcome = 'gate: {
            let (sanity, checked) = stages::input_sanity(context, policy);
            if let Some((reason, stage)) = builder.push(sanity) {
                break 'gate DecisionOutcome::NoSignal { reason, stage };
            }
            let records = [
                stages::manual_override(input.market_override, input.decided_at),
                stages::core_risk(&checked, input.calibration, policy),
                stages::auxiliary_signals(&checked, input.inference, policy),
            ];
            for record in records {
                if let Some((reason, stage)) = builder.push(record) {
                    break 'gate DecisionOutcome::NoSignal { reason, stage };
                }
            }

            let (guardrails, selection) = stages::guardrails(
                &checked,
                input.strategy,
                rules.as_ref().map(Option::as_ref).map_err(|code| *code),
                policy,
            );
            if let Some((reason, stage)) = builder.push(guardrails) {
                break 'gate DecisionOutcome::NoSignal { reason, stage };
            }
            let emission = stages::emission(&checked, input.strategy, selection.as_ref());
            if let Some((reason, stage)) = builder.push(emission) {
                break 'gate DecisionOutcome::NoSignal { reason, stage };
            }
            match selection {
                Some(s) => DecisionOutcome::Signal(SignalPayload {
                    selection: s.selection,
                    odds: s.odds,
                    probability: s.probability,
                    edge: s.edge,
                    stake_fraction: s.stake_fraction,
                    regime: s.regime,
                }),
                None => DecisionOutcome::NoSignal {
                    reason: ReasonCode::IncompleteJustification,
                    stage: GateStage::Emission,
                },
            }
        };

        debug!(
            market = %context.market,
            match_id = %context.match_id,
            strategy_id = ?input.strategy.map(|s| s.id),
            policy_version = input.policy.version,
            path = ?input.path,
            reason = outcome.reason().as_str(),
            "Gate decision"
        );

        DecisionTrace {
            trace_id: Uuid::new_v4(),
            market: context.market.clone(),
            match_id: context.match_id.clone(),
            strategy_id: input.strategy.map(|s| s.id),
            policy_version: input.policy.version,
            path: input.path,
            decided_at: input.decided_at,
            stages: builder.stages,
            warnings: builder.warnings,
            outcome,
        }
    }
}
