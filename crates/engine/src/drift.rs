//! Periodic drift sweep over every market with an active strategy.

use crate::error::EngineError;
use crate::governor::{ResourceGovernor, WorkloadClass};
use chrono::{DateTime, Utc};
use configuration::{Config, PolicyConfig};
use core_types::{MarketId, StrategyStatus, TransitionAudit};
use database::{PolicyStore, StrategyStore};
use promotion::{DriftReading, PromotionManager};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::time::{Duration, interval};
use tracing::{error, info};

#[derive(Debug, Clone, Serialize)]
pub struct DriftSweep {
    pub market: MarketId,
    pub reading: Option<DriftReading>,
    pub rollback: Option<TransitionAudit>,
}

/// Runs in a background task next to the live service and rolls back active
/// strategies whose realized ROI has drifted from expectation.
pub struct DriftMonitor<S> {
    store: Arc<S>,
    governor: Arc<ResourceGovernor>,
    promotion: PromotionManager,
    policy: PolicyConfig,
}

impl<S> DriftMonitor<S>
where
    S: StrategyStore + PolicyStore,
{
    pub fn new(store: Arc<S>, governor: Arc<ResourceGovernor>, config: &Config) -> Self {
        Self {
            store,
            governor,
            promotion: PromotionManager::from_config(config),
            policy: config.policy.clone(),
        }
    }

    /// Markets that currently have an active strategy.
    pub async fn active_markets(&self) -> Result<Vec<MarketId>, EngineError> {
        let markets: BTreeSet<MarketId> = self
            .store
            .all_strategies()
            .await?
            .into_iter()
            .filter(|s| s.status() == StrategyStatus::Active)
            .map(|s| s.market)
            .collect();
        Ok(markets.into_iter().collect())
    }

    /// Checks each of `markets` once. The stored policy is read once for the
    /// whole sweep.
    pub async fn sweep(
        &self,
        markets: &[MarketId],
        now: DateTime<Utc>,
    ) -> Result<Vec<DriftSweep>, EngineError> {
        let base = self.store.current_policy().await?;
        let mut results = Vec::with_capacity(markets.len());
        for market in markets {
            let _permit = self.governor.acquire(WorkloadClass::Risk).await?;
            let policy = self.policy.for_market(&base, market)?;
            let (reading, rollback) = self
                .promotion
                .drift_check(self.store.as_ref(), market, &policy.values, now)
                .await?;
            results.push(DriftSweep {
                market: market.clone(),
                reading,
                rollback,
            });
        }
        info!(
            markets = results.len(),
            rollbacks = results.iter().filter(|r| r.rollback.is_some()).count(),
            policy_version = base.version,
            "Drift sweep complete"
        );
        Ok(results)
    }

    /// Sweeps every `period` until the task is dropped.
    pub async fn start(self, period: Duration) {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            let result = match self.active_markets().await {
                Ok(markets) => self.sweep(&markets, Utc::now()).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                error!(error = %e, "Drift sweep failed");
            }
        }
    }
}
