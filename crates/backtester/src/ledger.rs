//! Bankroll bookkeeping for a replay: one ledger entry per emitted signal and
//! one equity point per settled bet.

use crate::error::BacktestError;
use chrono::{DateTime, Utc};
use core_types::{Outcome, SignalPayload};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BetResult {
    Won,
    Lost,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub match_id: String,
    pub kickoff: DateTime<Utc>,
    pub selection: Outcome,
    pub edge: f64,
    pub odds: Decimal,
    pub stake: Decimal,
    pub result: BetResult,
    pub profit: Decimal,
    pub bankroll_before: Decimal,
    pub bankroll_after: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EquityPoint {
    pub at: DateTime<Utc>,
    pub bankroll: Decimal,
}

pub(crate) fn to_decimal(value: f64) -> Result<Decimal, BacktestError> {
    Decimal::from_f64_retain(value).ok_or(BacktestError::Decimal(value))
}

/// Running bankroll of one replay.
#[derive(Debug, Clone)]
pub struct Bankroll {
    initial: Decimal,
    current: Decimal,
    peak: Decimal,
    max_drawdown: Decimal,
    staked: Decimal,
    ledger: Vec<LedgerEntry>,
    equity: Vec<EquityPoint>,
}

impl Bankroll {
    pub fn new(initial: Decimal, start: DateTime<Utc>) -> Self {
        Self {
            initial,
            current: initial,
            peak: initial,
            max_drawdown: Decimal::ZERO,
            staked: Decimal::ZERO,
            ledger: Vec::new(),
            equity: vec![EquityPoint {
                at: start,
                bankroll: initial,
            }],
        }
    }

    pub fn current(&self) -> Decimal {
        self.current
    }

    /// Stakes `signal` on the current bankroll and settles it against `result`.
    pub fn settle(
        &mut self,
        match_id: &str,
        kickoff: DateTime<Utc>,
        signal: &SignalPayload,
        result: Outcome,
    ) -> Result<&LedgerEntry, BacktestError> {
        let odds = to_decimal(signal.odds)?;
        let stake = (self.current * to_decimal(signal.stake_fraction)?).round_dp(2);
        let (result, profit) = if result == signal.selection {
            (BetResult::Won, (stake * (odds - Decimal::ONE)).round_dp(2))
        } else {
            (BetResult::Lost, -stake)
        };

        let before = self.current;
        self.current += profit;
        self.staked += stake;
        self.peak = self.peak.max(self.current);
        if self.peak > Decimal::ZERO {
            self.max_drawdown = self.max_drawdown.max((self.peak - self.current) / self.peak);
        }
        self.equity.push(EquityPoint {
            at: kickoff,
            bankroll: self.current,
        });
        self.ledger.push(LedgerEntry {
            match_id: match_id.to_string(),
            kickoff,
            selection: signal.selection,
            edge: signal.edge,
            odds,
            stake,
            result,
            profit,
            bankroll_before: before,
            bankroll_after: self.current,
        });
        Ok(&self.ledger[self.ledger.len() - 1])
    }

    pub fn profit(&self) -> Decimal {
        self.current - self.initial
    }

    /// Profit over total stake, zero when nothing was staked.
    pub fn roi(&self) -> Decimal {
        if self.staked.is_zero() {
            Decimal::ZERO
        } else {
            self.profit() / self.staked
        }
    }

    pub fn staked(&self) -> Decimal {
        self.staked
    }

    pub fn max_drawdown(&self) -> Decimal {
        self.max_drawdown
    }

    /// Consumes the bankroll, returning the ledger and the equity curve in
    /// chronological order.
    pub fn into_parts(self) -> (Vec<LedgerEntry>, Vec<EquityPoint>) {
        (self.ledger, self.equity)
    }
}
