//! # Oddsmith Analyzer
//!
//! Read-only summaries of the strategy history for administrative tools:
//! strategies per market, grouped by lifecycle status, with the statistics an
//! operator compares before promoting or archiving.

use crate::error::AnalyzerError;
use chrono::{DateTime, Utc};
use core_types::{Archetype, MarketId, Strategy, StrategyStatus};
use database::StrategyStore;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use uuid::Uuid;

pub mod error;

/// Which strategies to summarize. `None` means all.
#[derive(Debug, Clone, Default)]
pub struct StrategyQuery {
    pub market: Option<MarketId>,
    pub status: Option<StrategyStatus>,
}

impl StrategyQuery {
    fn matches(&self, strategy: &Strategy) -> bool {
        self.market.as_ref().is_none_or(|m| &strategy.market == m)
            && self.status.is_none_or(|s| strategy.status() == s)
    }
}

/// One strategy as listed to an operator.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyRow {
    pub id: Uuid,
    pub status: StrategyStatus,
    pub archetype: Option<Archetype>,
    pub generation: usize,
    pub validation_roi: f64,
    pub validation_sharpe: f64,
    pub validation_bets: usize,
    pub stress_passed: bool,
    pub age_days: i64,
}

/// Statistics over the strategies of one status.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub status: StrategyStatus,
    pub count: usize,
    pub best_validation_roi: f64,
    pub stress_pass_rate: f64,
    pub avg_validation_roi: f64,
    pub avg_sharpe: f64,
    pub avg_bet_count: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketSummary {
    pub market: MarketId,
    pub active: Option<Uuid>,
    /// Shadow, active and archived, in that order, when present.
    pub groups: Vec<StatusSummary>,
    /// Best validation ROI first.
    pub strategies: Vec<StrategyRow>,
}

/// Averages across every market in the result.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSummary {
    pub markets: usize,
    pub strategies: usize,
    pub active: usize,
    pub avg_validation_roi: f64,
    pub avg_sharpe: f64,
    pub avg_bet_count: f64,
    pub stress_pass_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyReport {
    pub markets: Vec<MarketSummary>,
    pub portfolio: PortfolioSummary,
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

fn row(strategy: &Strategy, now: DateTime<Utc>) -> StrategyRow {
    StrategyRow {
        id: strategy.id,
        status: strategy.status(),
        archetype: strategy.archetype,
        generation: strategy.generation,
        validation_roi: strategy.validation.roi,
        validation_sharpe: strategy.validation.sharpe,
        validation_bets: strategy.validation.bet_count,
        stress_passed: strategy.stress_passed(),
        age_days: strategy.age(now).num_days(),
    }
}

fn summarize_status(status: StrategyStatus, rows: &[&StrategyRow]) -> StatusSummary {
    StatusSummary {
        status,
        count: rows.len(),
        best_validation_roi: rows
            .iter()
            .map(|r| r.validation_roi)
            .fold(f64::NEG_INFINITY, f64::max),
        stress_pass_rate: mean(rows.iter().map(|r| if r.stress_passed { 1.0 } else { 0.0 })),
        avg_validation_roi: mean(rows.iter().map(|r| r.validation_roi)),
        avg_sharpe: mean(rows.iter().map(|r| r.validation_sharpe)),
        avg_bet_count: mean(rows.iter().map(|r| r.validation_bets as f64)),
    }
}

/// Groups `strategies` by market and status.
pub fn summarize(strategies: &[Strategy], query: &StrategyQuery, now: DateTime<Utc>) -> StrategyReport {
    let mut by_market: BTreeMap<&MarketId, Vec<StrategyRow>> = BTreeMap::new();
    for strategy in strategies.iter().filter(|s| query.matches(s)) {
        by_market
            .entry(&strategy.market)
            .or_default()
            .push(row(strategy, now));
    }

    let markets: Vec<MarketSummary> = by_market
        .into_iter()
        .map(|(market, mut rows)| {
            rows.sort_by(|a, b| {
                b.validation_roi
                    .partial_cmp(&a.validation_roi)
                    .unwrap_or(Ordering::Equal)
            });
            let groups = [
                StrategyStatus::Shadow,
                StrategyStatus::Active,
                StrategyStatus::Archived,
            ]
            .into_iter()
            .filter_map(|status| {
                let members: Vec<&StrategyRow> = rows.iter().filter(|r| r.status == status).collect();
                (!members.is_empty()).then(|| summarize_status(status, &members))
            })
            .collect();
            MarketSummary {
                market: market.clone(),
                active: rows
                    .iter()
                    .find(|r| r.status == StrategyStatus::Active)
                    .map(|r| r.id),
                groups,
                strategies: rows,
            }
        })
        .collect();

    let all = || markets.iter().flat_map(|m| m.strategies.iter());
    let portfolio = PortfolioSummary {
        markets: markets.len(),
        strategies: all().count(),
        active: markets.iter().filter(|m| m.active.is_some()).count(),
        avg_validation_roi: mean(all().map(|r| r.validation_roi)),
        avg_sharpe: mean(all().map(|r| r.validation_sharpe)),
        avg_bet_count: mean(all().map(|r| r.validation_bets as f64)),
        stress_pass_rate: mean(all().map(|r| if r.stress_passed { 1.0 } else { 0.0 })),
    };
    StrategyReport { markets, portfolio }
}

/// The main analysis engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct Analyzer;

impl Analyzer {
    pub fn new() -> Self {
        Self
    }

    /// Fetches and summarizes the strategies matching `query`.
    pub async fn run<S: StrategyStore>(
        &self,
        store: &S,
        query: &StrategyQuery,
        now: DateTime<Utc>,
    ) -> Result<StrategyReport, AnalyzerError> {
        let strategies = match &query.market {
            Some(market) => store.strategies_for_market(market).await?,
            None => store.all_strategies().await?,
        };
        let report = summarize(&strategies, query, now);
        if report.markets.is_empty() {
            let scope = query
                .market
                .as_ref()
                .map_or_else(|| "any market".to_string(), |m| format!("market {m}"));
            return Err(AnalyzerError::NoStrategiesFound(scope));
        }
        tracing::debug!(
            markets = report.portfolio.markets,
            strategies = report.portfolio.strategies,
            "Summarized strategies"
        );
        Ok(report)
    }
}
