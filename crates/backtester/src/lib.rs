//! # Oddsmith Backtester
//!
//! Replays one strategy over a historical window through the shared decision
//! gate and books every emitted signal against a simulated bankroll.
//!
//! ## Architectural Principles
//!
//! - **Same Gate As Live:** Every historical match goes through
//!   `decision_gate::StagedGate` on the replay path, with the calibration
//!   snapshot and overrides that were in force at kickoff.
//! - **One Policy Read:** The policy snapshot is read once per replay and
//!   used for every decision in it.
//! - **Decimal Bankroll:** Stakes, profits and balances use `rust_decimal`.
//!
//! ## Public API
//!
//! - `Backtester`: Loads the inputs and runs a replay.
//! - `replay`: The pure replay over in-memory inputs.
//! - `BacktestReport`, `LedgerEntry`, `EquityPoint`: Results.

pub mod error;
pub mod ledger;

pub use error::BacktestError;
pub use ledger::{Bankroll, BetResult, EquityPoint, LedgerEntry};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use configuration::{BacktestConfig, Config, PolicyConfig, PolicySnapshot};
use core_types::{
    CalibrationSnapshot, DecisionOutcome, DecisionPath, MarketId, MarketOverride, MatchRecord,
    ReasonCode, Strategy,
};
use database::{OutcomeSource, OverrideStore, PolicyStore, SnapshotStore, StrategyStore};
use decision_gate::{AuxInference, DecisionGate, GateInput, StagedGate};
use indicatif::{ProgressBar, ProgressStyle};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

/// Which part of history to replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacktestWindow {
    /// Inclusive calendar dates.
    Explicit { from: NaiveDate, to: NaiveDate },
    /// The validation window recorded in the strategy's optimisation notes.
    Validation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedgerOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

#[derive(Debug, Clone)]
pub struct BacktestRequest {
    pub strategy_id: Uuid,
    pub window: BacktestWindow,
    pub order: LedgerOrder,
    pub show_progress: bool,
}

/// The point-in-time inputs of one replay.
#[derive(Debug, Clone, Copy)]
pub struct ReplayInputs<'a> {
    pub strategy: &'a Strategy,
    /// Settled matches, oldest first.
    pub records: &'a [MatchRecord],
    pub policy: &'a PolicySnapshot,
    /// Calibration snapshots of the market, ordered by anchor.
    pub snapshots: &'a [CalibrationSnapshot],
    pub overrides: &'a [MarketOverride],
    pub initial_bankroll: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub strategy_id: Uuid,
    pub market: MarketId,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub policy_version: u64,
    pub decisions: usize,
    pub signals: usize,
    /// No-signal decisions by reason code.
    pub no_signal: BTreeMap<ReasonCode, usize>,
    pub initial_bankroll: Decimal,
    pub final_bankroll: Decimal,
    pub total_staked: Decimal,
    pub profit: Decimal,
    pub roi: Decimal,
    pub max_drawdown: Decimal,
    pub equity_curve: Vec<EquityPoint>,
    pub ledger: Vec<LedgerEntry>,
}

impl BacktestReport {
    fn ordered(mut self, order: LedgerOrder) -> Self {
        if order == LedgerOrder::NewestFirst {
            self.ledger.reverse();
            self.equity_curve.reverse();
        }
        self
    }
}

/// The snapshot in force on `date`: the latest anchor not after it.
pub fn snapshot_at(snapshots: &[CalibrationSnapshot], date: NaiveDate) -> Option<&CalibrationSnapshot> {
    snapshots
        .iter()
        .filter(|s| s.anchor <= date)
        .max_by_key(|s| (s.anchor, s.computed_at))
}

/// The override in force at `at`; the one ending last wins.
pub fn override_at(overrides: &[MarketOverride], at: DateTime<Utc>) -> Option<&MarketOverride> {
    overrides
        .iter()
        .filter(|o| o.is_active(at))
        .max_by_key(|o| o.ends_at)
}

/// Replays `inputs.records` through the gate. The ledger and curve come back
/// oldest first.
pub fn replay(
    inputs: &ReplayInputs<'_>,
    gate: &dyn DecisionGate,
    progress: &ProgressBar,
) -> Result<BacktestReport, BacktestError> {
    let strategy = inputs.strategy;
    let (Some(first), Some(last)) = (inputs.records.first(), inputs.records.last()) else {
        return Err(BacktestError::DataUnavailable);
    };

    let mut bankroll = Bankroll::new(inputs.initial_bankroll, first.kickoff);
    let mut decisions = 0;
    let mut signals = 0;
    let mut no_signal = BTreeMap::new();

    for record in inputs.records {
        progress.inc(1);
        let Some(result) = record.result else {
            continue;
        };
        let trace = gate.evaluate(&GateInput {
            context: record,
            strategy: Some(strategy),
            policy: inputs.policy,
            calibration: snapshot_at(inputs.snapshots, record.kickoff.date_naive()),
            market_override: override_at(inputs.overrides, record.kickoff),
            inference: AuxInference::from_record(record),
            path: DecisionPath::Replay,
            decided_at: record.kickoff,
        });
        decisions += 1;

        match &trace.outcome {
            DecisionOutcome::Signal(signal) => {
                signals += 1;
                bankroll.settle(&record.match_id, record.kickoff, signal, result)?;
            }
            DecisionOutcome::NoSignal { reason, .. } => {
                *no_signal.entry(*reason).or_insert(0) += 1;
            }
        }
    }

    let final_bankroll = bankroll.current();
    let total_staked = bankroll.staked();
    let profit = bankroll.profit();
    let roi = bankroll.roi();
    let max_drawdown = bankroll.max_drawdown();
    let (ledger, equity_curve) = bankroll.into_parts();
    Ok(BacktestReport {
        strategy_id: strategy.id,
        market: strategy.market.clone(),
        from: first.kickoff.date_naive(),
        to: last.kickoff.date_naive(),
        policy_version: inputs.policy.version,
        decisions,
        signals,
        no_signal,
        initial_bankroll: inputs.initial_bankroll,
        final_bankroll,
        total_staked,
        profit,
        roi,
        max_drawdown,
        equity_curve,
        ledger,
    })
}

/// The main backtesting engine.
#[derive(Debug, Clone)]
pub struct Backtester {
    config: BacktestConfig,
    policy: PolicyConfig,
    gate: StagedGate,
}

impl Backtester {
    pub fn new(config: BacktestConfig, policy: PolicyConfig) -> Self {
        Self {
            config,
            policy,
            gate: StagedGate::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.backtest.clone(), config.policy.clone())
    }

    fn progress_bar(&self, len: usize, show: bool) -> Result<ProgressBar, BacktestError> {
        if !show {
            return Ok(ProgressBar::hidden());
        }
        let bar = ProgressBar::new(len as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} matches ({eta})")?
                .progress_chars("=>-"),
        );
        Ok(bar)
    }

    /// Loads the strategy, its history and the point-in-time context, then
    /// replays it.
    pub async fn run<S>(&self, store: &S, request: &BacktestRequest) -> Result<BacktestReport, BacktestError>
    where
        S: StrategyStore + SnapshotStore + PolicyStore + OverrideStore + OutcomeSource,
    {
        let strategy = store.get_strategy(request.strategy_id).await?;
        let (from, to) = match request.window {
            BacktestWindow::Explicit { from, to } => (from, to),
            BacktestWindow::Validation => strategy.notes.validation_window,
        };
        if from > to {
            return Err(BacktestError::InvalidWindow(format!("{from} .. {to}")));
        }

        let start = from.and_time(chrono::NaiveTime::MIN).and_utc();
        let end = to.and_time(chrono::NaiveTime::MIN).and_utc() + Duration::days(1);
        let records = store.fetch_history(&strategy.market, start, end).await?;
        let policy = self
            .policy
            .for_market(&store.current_policy().await?, &strategy.market)?;
        let snapshots = store.snapshots(&strategy.market).await?;
        let overrides = store.overrides(&strategy.market).await?;

        info!(
            strategy_id = %strategy.id,
            market = %strategy.market,
            %from,
            %to,
            records = records.len(),
            policy_version = policy.version,
            "Starting backtest replay"
        );

        let progress = self.progress_bar(records.len(), request.show_progress)?;
        let report = replay(
            &ReplayInputs {
                strategy: &strategy,
                records: &records,
                policy: &policy,
                snapshots: &snapshots,
                overrides: &overrides,
                initial_bankroll: self.config.initial_bankroll,
            },
            &self.gate,
            &progress,
        )?;
        progress.finish_with_message("Replay complete.");

        info!(
            strategy_id = %strategy.id,
            signals = report.signals,
            decisions = report.decisions,
            roi = %report.roi,
            "Backtest replay finished"
        );
        Ok(BacktestReport { from, to, ..report }.ordered(request.order))
    }
}
