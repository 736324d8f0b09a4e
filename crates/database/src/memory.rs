use crate::error::{SourceError, StoreError};
use crate::store::{
    LifecycleChange, OutcomeSource, OverrideStore, PolicyAudit, PolicyStore, SnapshotStore,
    StrategyStore, TraceStore,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use configuration::{PolicySnapshot, PolicyValues};
use core_types::{
    CalibrationSnapshot, DecisionTrace, MarketId, MarketOverride, MatchRecord, SnapshotSource,
    Strategy, StrategyStatus, TransitionAudit,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default)]
struct MemoryState {
    strategies: HashMap<Uuid, Strategy>,
    audits: Vec<TransitionAudit>,
    traces: Vec<DecisionTrace>,
    snapshots: Vec<CalibrationSnapshot>,
    policy: PolicySnapshot,
    policy_audit: Vec<PolicyAudit>,
    overrides: Vec<MarketOverride>,
    records: BTreeMap<MarketId, Vec<MatchRecord>>,
    transient_failures: u32,
}

/// A process-local store used by tests and dry runs. Cloning shares the
/// underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRepository {
    pub fn new(policy: PolicyValues) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                policy: PolicySnapshot::new(0, policy),
                ..MemoryState::default()
            })),
        }
    }

    /// Loads historical records served by [`OutcomeSource`].
    pub async fn insert_records(&self, records: impl IntoIterator<Item = MatchRecord>) {
        let mut state = self.state.lock().await;
        for record in records {
            state.records.entry(record.market.clone()).or_default().push(record);
        }
        for market_records in state.records.values_mut() {
            market_records.sort_by(|a, b| a.kickoff.cmp(&b.kickoff));
        }
    }

    /// Makes the next `count` history fetches fail with a transient error.
    pub async fn fail_next_fetches(&self, count: u32) {
        self.state.lock().await.transient_failures = count;
    }
}

fn sorted_by_creation(mut strategies: Vec<Strategy>) -> Vec<Strategy> {
    strategies.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    strategies
}

#[async_trait]
impl StrategyStore for MemoryRepository {
    async fn insert_strategies(&self, strategies: &[Strategy]) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let mut staged = state.strategies.clone();
        for strategy in strategies {
            if staged.contains_key(&strategy.id) {
                return Err(StoreError::Duplicate(strategy.id));
            }
            if strategy.status() == StrategyStatus::Active
                && staged
                    .values()
                    .any(|s| s.market == strategy.market && s.status() == StrategyStatus::Active)
            {
                return Err(StoreError::ActiveConflict(strategy.market.to_string()));
            }
            staged.insert(strategy.id, strategy.clone());
        }
        state.strategies = staged;
        Ok(())
    }

    async fn get_strategy(&self, id: Uuid) -> Result<Strategy, StoreError> {
        self.state
            .lock()
            .await
            .strategies
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("strategy {id}")))
    }

    async fn strategies_for_market(&self, market: &MarketId) -> Result<Vec<Strategy>, StoreError> {
        let state = self.state.lock().await;
        Ok(sorted_by_creation(
            state
                .strategies
                .values()
                .filter(|s| &s.market == market)
                .cloned()
                .collect(),
        ))
    }

    async fn all_strategies(&self) -> Result<Vec<Strategy>, StoreError> {
        let state = self.state.lock().await;
        Ok(sorted_by_creation(state.strategies.values().cloned().collect()))
    }

    async fn active_strategy(&self, market: &MarketId) -> Result<Option<Strategy>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .strategies
            .values()
            .find(|s| &s.market == market && s.status() == StrategyStatus::Active)
            .cloned())
    }

    async fn apply_transitions(&self, changes: &[LifecycleChange]) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;

        // Stage every write on a copy so a failure leaves the store untouched.
        let mut staged = state.strategies.clone();
        for change in changes {
            let id = change.strategy.id;
            let stored = staged
                .get(&id)
                .ok_or_else(|| StoreError::NotFound(format!("strategy {id}")))?;
            if stored.version != change.expected_version {
                return Err(StoreError::Conflict {
                    strategy_id: id,
                    expected_version: change.expected_version,
                });
            }
            let mut next = change.strategy.clone();
            next.version = change.expected_version + 1;
            if next.status() == StrategyStatus::Active
                && staged.values().any(|s| {
                    s.id != id && s.market == next.market && s.status() == StrategyStatus::Active
                })
            {
                return Err(StoreError::ActiveConflict(next.market.to_string()));
            }
            staged.insert(id, next);
        }

        state.strategies = staged;
        state
            .audits
            .extend(changes.iter().map(|change| change.audit.clone()));
        Ok(())
    }

    async fn save_progress(
        &self,
        strategy: &Strategy,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let stored = state
            .strategies
            .get_mut(&strategy.id)
            .ok_or_else(|| StoreError::NotFound(format!("strategy {}", strategy.id)))?;
        if stored.version != expected_version {
            return Err(StoreError::Conflict {
                strategy_id: strategy.id,
                expected_version,
            });
        }
        if stored.status() != strategy.status() {
            return Err(StoreError::MissingAudit);
        }
        *stored = strategy.clone();
        stored.version = expected_version + 1;
        Ok(())
    }

    async fn audits(&self, market: &MarketId) -> Result<Vec<TransitionAudit>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .audits
            .iter()
            .filter(|a| &a.market == market)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TraceStore for MemoryRepository {
    async fn save_trace(&self, trace: &DecisionTrace) -> Result<(), StoreError> {
        self.state.lock().await.traces.push(trace.clone());
        Ok(())
    }

    async fn traces_for_market(
        &self,
        market: &MarketId,
        limit: usize,
    ) -> Result<Vec<DecisionTrace>, StoreError> {
        let state = self.state.lock().await;
        let mut traces: Vec<DecisionTrace> = state
            .traces
            .iter()
            .filter(|t| &t.market == market)
            .cloned()
            .collect();
        traces.sort_by(|a, b| b.decided_at.cmp(&a.decided_at));
        traces.truncate(limit);
        Ok(traces)
    }
}

#[async_trait]
impl SnapshotStore for MemoryRepository {
    async fn save_snapshots(&self, snapshots: &[CalibrationSnapshot]) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        for snapshot in snapshots {
            // One snapshot per (market, anchor, source); a rerun replaces it.
            state.snapshots.retain(|s| {
                !(s.market == snapshot.market
                    && s.anchor == snapshot.anchor
                    && s.source == snapshot.source)
            });
            state.snapshots.push(snapshot.clone());
        }
        Ok(())
    }

    async fn snapshots(&self, market: &MarketId) -> Result<Vec<CalibrationSnapshot>, StoreError> {
        let state = self.state.lock().await;
        let mut snapshots: Vec<CalibrationSnapshot> = state
            .snapshots
            .iter()
            .filter(|s| &s.market == market)
            .cloned()
            .collect();
        snapshots.sort_by_key(|s| s.anchor);
        Ok(snapshots)
    }

    async fn latest_snapshot(
        &self,
        market: &MarketId,
        at: NaiveDate,
    ) -> Result<Option<CalibrationSnapshot>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .snapshots
            .iter()
            .filter(|s| &s.market == market && s.anchor <= at)
            .max_by_key(|s| (s.anchor, s.computed_at))
            .cloned())
    }

    async fn clear_retroactive(&self, markets: &[MarketId]) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.snapshots.len();
        state
            .snapshots
            .retain(|s| s.source == SnapshotSource::Live || !markets.contains(&s.market));
        Ok((before - state.snapshots.len()) as u64)
    }
}

#[async_trait]
impl PolicyStore for MemoryRepository {
    async fn current_policy(&self) -> Result<PolicySnapshot, StoreError> {
        Ok(self.state.lock().await.policy.clone())
    }

    async fn update_policy(
        &self,
        key: &str,
        value: Value,
        actor: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<PolicySnapshot, StoreError> {
        let mut state = self.state.lock().await;
        let old_value = state.policy.values.get(key)?;
        let values = state.policy.values.with_value(key, value.clone())?;
        let next = PolicySnapshot::new(state.policy.version + 1, values);
        state.policy_audit.push(PolicyAudit {
            version: next.version,
            key: key.to_ascii_uppercase(),
            old_value,
            new_value: value,
            actor: actor.to_string(),
            reason: reason.to_string(),
            at,
        });
        state.policy = next.clone();
        Ok(next)
    }

    async fn policy_history(&self) -> Result<Vec<PolicyAudit>, StoreError> {
        Ok(self.state.lock().await.policy_audit.clone())
    }
}

#[async_trait]
impl OverrideStore for MemoryRepository {
    async fn add_override(&self, market_override: &MarketOverride) -> Result<(), StoreError> {
        self.state.lock().await.overrides.push(market_override.clone());
        Ok(())
    }

    async fn overrides(&self, market: &MarketId) -> Result<Vec<MarketOverride>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .overrides
            .iter()
            .filter(|o| &o.market == market)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OutcomeSource for MemoryRepository {
    async fn fetch_history(
        &self,
        market: &MarketId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MatchRecord>, SourceError> {
        let mut state = self.state.lock().await;
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(SourceError::Transient(format!(
                "history for {market} temporarily unavailable"
            )));
        }
        Ok(state
            .records
            .get(market)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.kickoff >= from && r.kickoff < to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn markets(&self) -> Result<Vec<MarketId>, SourceError> {
        Ok(self.state.lock().await.records.keys().cloned().collect())
    }
}
