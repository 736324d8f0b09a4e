//! # Oddsmith Promotion Manager
//!
//! The lifecycle state machine of persisted strategies:
//! `shadow -> active`, `active -> archived` and `shadow -> archived`.
//!
//! ## Architectural Principles
//!
//! - **Audited:** Every status change is written together with its
//!   `TransitionAudit` in one atomic store call. There is no path that
//!   changes a status without one.
//! - **One active strategy per market:** Promotion archives the current
//!   active strategy and activates the new one in the same atomic write.
//!   Writes are conditional on the version that was read; conflicts are
//!   re-read and retried up to `conflict_attempts` times.
//! - **Explicit inputs:** The policy snapshot and the clock are passed into
//!   every call. The manager itself only holds its write settings.
//!
//! ## Public API
//!
//! - `PromotionManager`: Gated and manual promotion, archiving, tip
//!   recording, drift rollback and the retraining cooldown.
//! - `promotion_blockers` / `DriftReading`: The pure gate checks.

pub mod error;
pub mod gates;

pub use error::PromotionError;
pub use gates::{DriftReading, PromotionBlocker, promotion_blockers, push_bounded};

use chrono::{DateTime, Duration, Utc};
use configuration::{Config, PolicyValues, PromotionConfig};
use core_types::{
    ActiveState, ArchivedState, Lifecycle, MarketId, Strategy, StrategyStatus, TipOutcome,
    TransitionAudit, TransitionReason,
};
use database::{LifecycleChange, StoreError, StrategyStore};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// What a tip did to its strategy.
#[derive(Debug, Clone, Serialize)]
pub struct TipRecorded {
    pub strategy_id: Uuid,
    pub status: StrategyStatus,
    /// Present when the tip completed a drifting window and the strategy
    /// was rolled back.
    pub rollback: Option<TransitionAudit>,
    pub drift: Option<DriftReading>,
}

fn audit(
    strategy: &Strategy,
    to: StrategyStatus,
    actor: &str,
    reason: TransitionReason,
    detail: String,
    at: DateTime<Utc>,
) -> TransitionAudit {
    TransitionAudit {
        id: Uuid::new_v4(),
        strategy_id: strategy.id,
        market: strategy.market.clone(),
        from: strategy.status(),
        to,
        actor: actor.to_string(),
        reason,
        detail,
        at,
    }
}

/// Builds the change that moves `strategy` into `lifecycle`.
fn transition(
    strategy: &Strategy,
    lifecycle: Lifecycle,
    actor: &str,
    reason: TransitionReason,
    detail: String,
    at: DateTime<Utc>,
) -> Result<LifecycleChange, PromotionError> {
    strategy.lifecycle.check_transition(lifecycle.status())?;
    let audit = audit(strategy, lifecycle.status(), actor, reason, detail, at);
    let mut next = strategy.clone();
    next.lifecycle = lifecycle;
    Ok(LifecycleChange {
        strategy: next,
        expected_version: strategy.version,
        audit,
    })
}

fn archived(reason: TransitionReason, at: DateTime<Utc>, cooldown_until: Option<DateTime<Utc>>) -> Lifecycle {
    Lifecycle::Archived(ArchivedState {
        archived_at: at,
        reason,
        cooldown_until,
    })
}

#[derive(Debug, Clone, Default)]
pub struct PromotionManager {
    config: PromotionConfig,
}

impl PromotionManager {
    pub fn new(config: PromotionConfig) -> Self {
        Self { config }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.promotion.clone())
    }

    /// Runs `attempt` until it stops failing with a version conflict.
    async fn with_retries<T, F, Fut>(&self, strategy_id: Uuid, mut attempt: F) -> Result<T, PromotionError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, PromotionError>>,
    {
        let attempts = self.config.conflict_attempts.max(1);
        for n in 1..=attempts {
            match attempt().await {
                Err(PromotionError::Store(e)) if e.is_conflict() => {
                    warn!(%strategy_id, attempt = n, error = %e, "Lifecycle write conflicted, re-reading");
                }
                other => return other,
            }
        }
        Err(PromotionError::Contention {
            strategy_id,
            attempts,
        })
    }

    /// Appends freshly mined strategies as shadows, all of them or none.
    pub async fn register_shadows<S: StrategyStore>(
        &self,
        store: &S,
        strategies: &[Strategy],
    ) -> Result<usize, PromotionError> {
        if let Some(strategy) = strategies
            .iter()
            .find(|s| s.status() != StrategyStatus::Shadow)
        {
            return Err(PromotionError::Lifecycle(core_types::CoreError::IllegalTransition {
                from: "new".to_string(),
                to: strategy.status().to_string(),
            }));
        }
        store.insert_strategies(strategies).await?;
        info!(count = strategies.len(), "Registered shadow strategies");
        Ok(strategies.len())
    }

    /// Gated `shadow -> active`. Supersedes the market's current active
    /// strategy, if any, in the same atomic write.
    pub async fn promote<S: StrategyStore>(
        &self,
        store: &S,
        strategy_id: Uuid,
        policy: &PolicyValues,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<TransitionAudit>, PromotionError> {
        self.with_retries(strategy_id, || async move {
            let strategy = store.get_strategy(strategy_id).await?;
            let blockers = promotion_blockers(&strategy, policy);
            if !blockers.is_empty() {
                return Err(PromotionError::Ineligible {
                    strategy_id,
                    blockers,
                });
            }
            let Lifecycle::Shadow(shadow) = &strategy.lifecycle else {
                return Err(PromotionError::Ineligible {
                    strategy_id,
                    blockers: Vec::new(),
                });
            };
            let detail = format!(
                "{} shadow tips, shadow ROI {:.4}, expected ROI {:.4}, validation ROI {:.4}",
                shadow.tips,
                shadow.realized_roi(),
                shadow.expected_roi(),
                strategy.validation.roi
            );
            self.activate(store, &strategy, actor, TransitionReason::GatedPromotion, detail, now)
                .await
        })
        .await
    }

    /// Administrative activation. Skips the metric gates but not the state
    /// machine: only a shadow strategy can be activated, and the audit says
    /// the gates were bypassed.
    pub async fn activate_manual<S: StrategyStore>(
        &self,
        store: &S,
        strategy_id: Uuid,
        actor: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<TransitionAudit>, PromotionError> {
        self.with_retries(strategy_id, || async move {
            let strategy = store.get_strategy(strategy_id).await?;
            let detail = format!("manual activation, metric gates bypassed: {reason}");
            self.activate(store, &strategy, actor, TransitionReason::ManualActivation, detail, now)
                .await
        })
        .await
    }

    async fn activate<S: StrategyStore>(
        &self,
        store: &S,
        strategy: &Strategy,
        actor: &str,
        reason: TransitionReason,
        detail: String,
        now: DateTime<Utc>,
    ) -> Result<Vec<TransitionAudit>, PromotionError> {
        let mut changes = Vec::with_capacity(2);
        if let Some(current) = store.active_strategy(&strategy.market).await? {
            changes.push(transition(
                &current,
                archived(TransitionReason::Superseded, now, None),
                actor,
                TransitionReason::Superseded,
                format!("superseded by {}", strategy.id),
                now,
            )?);
        }
        changes.push(transition(
            strategy,
            Lifecycle::Active(ActiveState {
                activated_at: now,
                activated_by: actor.to_string(),
                recent_tips: Vec::new(),
            }),
            actor,
            reason,
            detail,
            now,
        )?);

        store.apply_transitions(&changes).await?;
        info!(
            market = %strategy.market,
            strategy_id = %strategy.id,
            superseded = changes.len() > 1,
            ?reason,
            "Strategy activated"
        );
        Ok(changes.into_iter().map(|c| c.audit).collect())
    }

    /// Retires a shadow or active strategy by hand.
    pub async fn archive<S: StrategyStore>(
        &self,
        store: &S,
        strategy_id: Uuid,
        actor: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<TransitionAudit, PromotionError> {
        self.with_retries(strategy_id, || async move {
            let strategy = store.get_strategy(strategy_id).await?;
            let change = transition(
                &strategy,
                archived(TransitionReason::ManualArchive, now, None),
                actor,
                TransitionReason::ManualArchive,
                reason.to_string(),
                now,
            )?;
            store.apply_transitions(std::slice::from_ref(&change)).await?;
            info!(market = %strategy.market, %strategy_id, "Strategy archived");
            Ok(change.audit)
        })
        .await
    }

    /// Attributes a settled tip to its strategy. Shadow strategies add it to
    /// their tallies; active ones add it to the drift window and are rolled
    /// back when the window breaches the policy.
    pub async fn record_tip<S: StrategyStore>(
        &self,
        store: &S,
        strategy_id: Uuid,
        tip: TipOutcome,
        policy: &PolicyValues,
        now: DateTime<Utc>,
    ) -> Result<TipRecorded, PromotionError> {
        self.with_retries(strategy_id, || async move {
            let strategy = store.get_strategy(strategy_id).await?;
            let mut next = strategy.clone();
            match &mut next.lifecycle {
                Lifecycle::Shadow(shadow) => {
                    shadow.record(&tip);
                    store.save_progress(&next, strategy.version).await?;
                    Ok(TipRecorded {
                        strategy_id,
                        status: StrategyStatus::Shadow,
                        rollback: None,
                        drift: None,
                    })
                }
                Lifecycle::Active(active) => {
                    push_bounded(&mut active.recent_tips, tip, policy.drift_window_tips);
                    let reading = DriftReading::over(&active.recent_tips);
                    if reading.breaches(policy) {
                        let audit = self.roll_back(store, &next, strategy.version, reading, policy, now).await?;
                        return Ok(TipRecorded {
                            strategy_id,
                            status: StrategyStatus::Archived,
                            rollback: Some(audit),
                            drift: Some(reading),
                        });
                    }
                    store.save_progress(&next, strategy.version).await?;
                    Ok(TipRecorded {
                        strategy_id,
                        status: StrategyStatus::Active,
                        rollback: None,
                        drift: Some(reading),
                    })
                }
                Lifecycle::Archived(_) => Err(PromotionError::NotActive(strategy_id)),
            }
        })
        .await
    }

    /// Re-evaluates the active strategy of `market` against the current
    /// policy without a new tip. Returns the rollback audit if one happened.
    pub async fn drift_check<S: StrategyStore>(
        &self,
        store: &S,
        market: &MarketId,
        policy: &PolicyValues,
        now: DateTime<Utc>,
    ) -> Result<(Option<DriftReading>, Option<TransitionAudit>), PromotionError> {
        let Some(active) = store.active_strategy(market).await? else {
            return Ok((None, None));
        };
        self.with_retries(active.id, || async move {
            let strategy = store.get_strategy(active.id).await?;
            let Lifecycle::Active(state) = &strategy.lifecycle else {
                return Err(PromotionError::NotActive(strategy.id));
            };
            let reading = DriftReading::over(&state.recent_tips);
            if !reading.breaches(policy) {
                return Ok((Some(reading), None));
            }
            let audit = self
                .roll_back(store, &strategy, strategy.version, reading, policy, now)
                .await?;
            Ok((Some(reading), Some(audit)))
        })
        .await
    }

    async fn roll_back<S: StrategyStore>(
        &self,
        store: &S,
        strategy: &Strategy,
        expected_version: i64,
        reading: DriftReading,
        policy: &PolicyValues,
        now: DateTime<Utc>,
    ) -> Result<TransitionAudit, PromotionError> {
        let cooldown_until = now + Duration::hours(policy.retrain_cooldown_hours);
        let mut change = transition(
            strategy,
            archived(TransitionReason::DriftRollback, now, Some(cooldown_until)),
            "drift-monitor",
            TransitionReason::DriftRollback,
            format!(
                "realized ROI {:.4} vs expected {:.4} over {} tips (divergence {:.4} > {:.4})",
                reading.realized_roi,
                reading.expected_roi,
                reading.tips,
                reading.divergence,
                policy.drift_max_divergence
            ),
            now,
        )?;
        change.expected_version = expected_version;
        store.apply_transitions(std::slice::from_ref(&change)).await?;
        warn!(
            market = %strategy.market,
            strategy_id = %strategy.id,
            divergence = reading.divergence,
            %cooldown_until,
            "Active strategy rolled back on drift"
        );
        Ok(change.audit)
    }

    /// End of the retraining cooldown for `market`, if one is still running.
    pub async fn retraining_cooldown<S: StrategyStore>(
        &self,
        store: &S,
        market: &MarketId,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(store
            .strategies_for_market(market)
            .await?
            .iter()
            .filter_map(|s| match &s.lifecycle {
                Lifecycle::Archived(state) => state.cooldown_until,
                _ => None,
            })
            .filter(|until| *until > now)
            .max())
    }
}
