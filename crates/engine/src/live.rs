//! The live decision service: point-in-time context in, persisted decision
//! trace out, through the same gate the backtester replays with.

use crate::error::EngineError;
use crate::governor::{ResourceGovernor, WorkloadClass};
use crate::retry::with_retry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use configuration::{Config, EngineConfig, PolicyConfig};
use core_types::{DecisionPath, DecisionTrace, MarketId, MatchRecord, TipOutcome};
use database::{OverrideStore, PolicyStore, SnapshotStore, SourceError, StrategyStore, TraceStore};
use decision_gate::{AuxInference, DecisionGate, GateInput, StagedGate};
use promotion::{PromotionManager, TipRecorded};
use std::sync::Arc;
use tokio::time::{Duration, Instant, timeout};
use tracing::{debug, info};
use uuid::Uuid;

/// Normalized context of an upcoming or in-progress match.
#[async_trait]
pub trait MatchContextSource: Send + Sync {
    async fn live_context(&self, market: &MarketId, match_id: &str) -> Result<MatchRecord, SourceError>;
}

/// The external market-inference service.
#[async_trait]
pub trait MarketInference: Send + Sync {
    /// Drift between the market and the model for this match.
    async fn drift(&self, context: &MatchRecord) -> Result<f64, SourceError>;
}

pub struct LiveDecisionService<S> {
    store: Arc<S>,
    governor: Arc<ResourceGovernor>,
    gate: StagedGate,
    policy: PolicyConfig,
    config: EngineConfig,
    promotion: PromotionManager,
    contexts: Option<Arc<dyn MatchContextSource>>,
    inference: Option<Arc<dyn MarketInference>>,
}

impl<S> LiveDecisionService<S>
where
    S: StrategyStore + TraceStore + SnapshotStore + PolicyStore + OverrideStore,
{
    pub fn new(store: Arc<S>, governor: Arc<ResourceGovernor>, config: &Config) -> Self {
        Self {
            store,
            governor,
            gate: StagedGate::new(),
            policy: config.policy.clone(),
            config: config.engine.clone(),
            promotion: PromotionManager::from_config(config),
            contexts: None,
            inference: None,
        }
    }

    pub fn with_context_source(mut self, source: Arc<dyn MatchContextSource>) -> Self {
        self.contexts = Some(source);
        self
    }

    pub fn with_inference(mut self, inference: Arc<dyn MarketInference>) -> Self {
        self.inference = Some(inference);
        self
    }

    /// Fetches the live context of `match_id` and decides on it.
    pub async fn decide(
        &self,
        market: &MarketId,
        match_id: &str,
        now: DateTime<Utc>,
    ) -> Result<DecisionTrace, EngineError> {
        let source = self
            .contexts
            .as_ref()
            .ok_or_else(|| EngineError::Configuration("no live match-context source".to_string()))?;
        let context = with_retry(
            "live context",
            self.config.retry_attempts,
            Duration::from_millis(self.config.retry_backoff_ms),
            || source.live_context(market, match_id),
        )
        .await?;
        if &context.market != market {
            return Err(EngineError::WrongMarket {
                match_id: match_id.to_string(),
                expected: market.to_string(),
                actual: context.market.to_string(),
            });
        }
        self.decide_context(&context, now).await
    }

    /// Decides on an already normalized context and persists the trace.
    pub async fn decide_context(
        &self,
        context: &MatchRecord,
        now: DateTime<Utc>,
    ) -> Result<DecisionTrace, EngineError> {
        let _permit = self.governor.acquire(WorkloadClass::Live).await?;
        let started = Instant::now();
        let market = &context.market;

        // One policy read per decision.
        let policy = self
            .policy
            .for_market(&self.store.current_policy().await?, market)?;
        let strategy = self.store.active_strategy(market).await?;
        let calibration = self.store.latest_snapshot(market, now.date_naive()).await?;
        let market_override = self.store.active_override(market, now).await?;
        let inference = self.infer(context).await;

        let trace = self.gate.evaluate(&GateInput {
            context,
            strategy: strategy.as_ref(),
            policy: &policy,
            calibration: calibration.as_ref(),
            market_override: market_override.as_ref(),
            inference,
            path: DecisionPath::Live,
            decided_at: now,
        });
        self.store.save_trace(&trace).await?;

        let elapsed = started.elapsed();
        self.governor.record_live_latency(elapsed).await;
        info!(
            %market,
            match_id = %context.match_id,
            strategy_id = ?trace.strategy_id,
            policy_version = trace.policy_version,
            reason = trace.outcome.reason().as_str(),
            latency_ms = elapsed.as_millis() as u64,
            "Live decision"
        );
        Ok(trace)
    }

    async fn infer(&self, context: &MatchRecord) -> AuxInference {
        let Some(inference) = &self.inference else {
            return AuxInference::from_record(context);
        };
        let limit = Duration::from_millis(self.config.inference_timeout_ms);
        match timeout(limit, inference.drift(context)).await {
            Ok(Ok(drift)) => AuxInference::Answered(drift),
            Ok(Err(error)) => {
                debug!(match_id = %context.match_id, %error, "Market inference failed");
                AuxInference::Unavailable
            }
            Err(_) => {
                debug!(match_id = %context.match_id, timeout_ms = self.config.inference_timeout_ms, "Market inference timed out");
                AuxInference::TimedOut
            }
        }
    }

    /// Books a settled tip against the strategy that produced it. Runs as a
    /// risk job.
    pub async fn settle_tip(
        &self,
        strategy_id: Uuid,
        tip: TipOutcome,
        now: DateTime<Utc>,
    ) -> Result<TipRecorded, EngineError> {
        let _permit = self.governor.acquire(WorkloadClass::Risk).await?;
        let strategy = self.store.get_strategy(strategy_id).await?;
        let policy = self
            .policy
            .for_market(&self.store.current_policy().await?, &strategy.market)?;
        Ok(self
            .promotion
            .record_tip(self.store.as_ref(), strategy_id, tip, &policy.values, now)
            .await?)
    }
}
