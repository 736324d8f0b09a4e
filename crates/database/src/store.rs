//! Persistence contracts. Every component talks to storage through these
//! traits, so the PostgreSQL adapter and the in-memory adapter are
//! interchangeable.

use crate::error::{SourceError, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use configuration::PolicySnapshot;
use core_types::{
    CalibrationSnapshot, DecisionTrace, MarketId, MarketOverride, MatchRecord, Strategy,
    TransitionAudit,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One lifecycle write: the strategy as it should look afterwards, the
/// version it was read at, and the audit record of the transition.
#[derive(Debug, Clone)]
pub struct LifecycleChange {
    pub strategy: Strategy,
    pub expected_version: i64,
    pub audit: TransitionAudit,
}

/// One entry of the policy's versioned audit history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyAudit {
    pub version: u64,
    pub key: String,
    pub old_value: Value,
    pub new_value: Value,
    pub actor: String,
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait StrategyStore: Send + Sync {
    /// Appends a new strategy. Stored strategies are never replaced.
    async fn insert_strategy(&self, strategy: &Strategy) -> Result<(), StoreError> {
        self.insert_strategies(std::slice::from_ref(strategy)).await
    }

    /// Appends a batch of new strategies: all of them or none.
    async fn insert_strategies(&self, strategies: &[Strategy]) -> Result<(), StoreError>;

    async fn get_strategy(&self, id: Uuid) -> Result<Strategy, StoreError>;

    /// All strategies of a market, oldest first.
    async fn strategies_for_market(&self, market: &MarketId) -> Result<Vec<Strategy>, StoreError>;

    async fn all_strategies(&self) -> Result<Vec<Strategy>, StoreError>;

    async fn active_strategy(&self, market: &MarketId) -> Result<Option<Strategy>, StoreError>;

    /// Applies status changes atomically: either every change lands with its
    /// audit record or none does.
    ///
    /// Each change must still be at `expected_version`; the stored version is
    /// bumped by one. Changes are applied in order, so a supersede lists the
    /// archive of the old active strategy before the new activation.
    async fn apply_transitions(&self, changes: &[LifecycleChange]) -> Result<(), StoreError>;

    /// Persists running tallies (shadow tips, recent live tips) without a
    /// status change.
    async fn save_progress(&self, strategy: &Strategy, expected_version: i64)
    -> Result<(), StoreError>;

    /// Transition audits of a market, oldest first.
    async fn audits(&self, market: &MarketId) -> Result<Vec<TransitionAudit>, StoreError>;
}

#[async_trait]
pub trait TraceStore: Send + Sync {
    async fn save_trace(&self, trace: &DecisionTrace) -> Result<(), StoreError>;

    /// The most recent traces of a market, newest first.
    async fn traces_for_market(
        &self,
        market: &MarketId,
        limit: usize,
    ) -> Result<Vec<DecisionTrace>, StoreError>;
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save_snapshots(&self, snapshots: &[CalibrationSnapshot]) -> Result<(), StoreError>;

    /// Snapshots of a market ordered by anchor.
    async fn snapshots(&self, market: &MarketId) -> Result<Vec<CalibrationSnapshot>, StoreError>;

    /// The newest snapshot anchored on or before `at`.
    async fn latest_snapshot(
        &self,
        market: &MarketId,
        at: NaiveDate,
    ) -> Result<Option<CalibrationSnapshot>, StoreError>;

    /// Deletes retroactive snapshots of `markets`; live snapshots are kept.
    async fn clear_retroactive(&self, markets: &[MarketId]) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn current_policy(&self) -> Result<PolicySnapshot, StoreError>;

    /// Sets one key, bumps the version and records the change.
    async fn update_policy(
        &self,
        key: &str,
        value: Value,
        actor: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<PolicySnapshot, StoreError>;

    async fn policy_history(&self) -> Result<Vec<PolicyAudit>, StoreError>;
}

#[async_trait]
pub trait OverrideStore: Send + Sync {
    async fn add_override(&self, market_override: &MarketOverride) -> Result<(), StoreError>;

    async fn overrides(&self, market: &MarketId) -> Result<Vec<MarketOverride>, StoreError>;

    /// The suppression window covering `at`, if any. When several overlap,
    /// the one ending last wins.
    async fn active_override(
        &self,
        market: &MarketId,
        at: DateTime<Utc>,
    ) -> Result<Option<MarketOverride>, StoreError> {
        Ok(self
            .overrides(market)
            .await?
            .into_iter()
            .filter(|o| o.is_active(at))
            .max_by_key(|o| o.ends_at))
    }
}

/// Historical outcomes, keyed by market and time range.
#[async_trait]
pub trait OutcomeSource: Send + Sync {
    async fn fetch_history(
        &self,
        market: &MarketId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MatchRecord>, SourceError>;

    async fn markets(&self) -> Result<Vec<MarketId>, SourceError>;
}

/// Everything the engine needs from storage.
pub trait Repository:
    StrategyStore + TraceStore + SnapshotStore + PolicyStore + OverrideStore + OutcomeSource
{
}

impl<T> Repository for T where
    T: StrategyStore + TraceStore + SnapshotStore + PolicyStore + OverrideStore + OutcomeSource
{
}
