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
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgPool;
use sqlx::{FromRow, Row};
use tracing::debug;
use uuid::Uuid;

/// PostgreSQL adapter for every store contract.
///
/// Records are stored as JSONB documents next to the columns the queries
/// filter on. The partial unique index on `strategies(market) WHERE status =
/// 'active'` backs the one-active-strategy-per-market rule.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: PgPool,
    /// Policy served while the `policy_versions` table is still empty.
    seed_policy: PolicyValues,
}

/// A row of the `strategies` table.
#[derive(FromRow, Debug, Clone)]
struct DbStrategy {
    version: i64,
    document: JsonValue,
}

impl DbStrategy {
    fn into_strategy(self) -> Result<Strategy, StoreError> {
        let mut strategy: Strategy = serde_json::from_value(self.document)?;
        strategy.version = self.version;
        Ok(strategy)
    }
}

fn documents<T: DeserializeOwned>(rows: Vec<sqlx::postgres::PgRow>) -> Result<Vec<T>, StoreError> {
    rows.into_iter()
        .map(|row| -> Result<T, StoreError> {
            Ok(serde_json::from_value(row.try_get::<JsonValue, _>("document")?)?)
        })
        .collect()
}

/// Maps unique-index violations on `strategies` to store errors: the
/// active-strategy index to a conflict, the primary key to a duplicate.
fn insert_conflict(error: sqlx::Error, strategy: &Strategy) -> StoreError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => match db.constraint() {
            Some("strategies_pkey") => StoreError::Duplicate(strategy.id),
            _ => StoreError::ActiveConflict(strategy.market.to_string()),
        },
        _ => error.into(),
    }
}

impl DbRepository {
    pub fn new(pool: PgPool, seed_policy: PolicyValues) -> Self {
        Self { pool, seed_policy }
    }

    /// Saves normalized match records. Idempotent on `(market, match_id)`.
    pub async fn save_match_records(&self, records: &[MatchRecord]) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for record in records {
            let result = sqlx::query(
                r#"
                INSERT INTO match_records (market, match_id, kickoff, document)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (market, match_id) DO UPDATE SET kickoff = EXCLUDED.kickoff, document = EXCLUDED.document
                "#,
            )
            .bind(record.market.as_str())
            .bind(&record.match_id)
            .bind(record.kickoff)
            .bind(serde_json::to_value(record)?)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn write_strategy(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        strategy: &Strategy,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        let mut next = strategy.clone();
        next.version = expected_version + 1;
        let result = sqlx::query(
            r#"
            UPDATE strategies
            SET status = $1, version = $2, document = $3
            WHERE id = $4 AND version = $5
            "#,
        )
        .bind(next.status().as_str())
        .bind(next.version)
        .bind(serde_json::to_value(&next)?)
        .bind(next.id)
        .bind(expected_version)
        .execute(&mut **tx)
        .await
        .map_err(|e| insert_conflict(e, &next))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict {
                strategy_id: next.id,
                expected_version,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StrategyStore for DbRepository {
    async fn insert_strategies(&self, strategies: &[Strategy]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for strategy in strategies {
            sqlx::query(
                r#"
                INSERT INTO strategies (id, market, status, version, created_at, document)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(strategy.id)
            .bind(strategy.market.as_str())
            .bind(strategy.status().as_str())
            .bind(strategy.version)
            .bind(strategy.created_at)
            .bind(serde_json::to_value(strategy)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| insert_conflict(e, strategy))?;
        }
        tx.commit().await?;
        debug!(count = strategies.len(), "Inserted strategies");
        Ok(())
    }

    async fn get_strategy(&self, id: Uuid) -> Result<Strategy, StoreError> {
        sqlx::query_as::<_, DbStrategy>("SELECT version, document FROM strategies WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::RowNotFound = e {
                    StoreError::NotFound(format!("strategy {id}"))
                } else {
                    e.into()
                }
            })?
            .into_strategy()
    }

    async fn strategies_for_market(&self, market: &MarketId) -> Result<Vec<Strategy>, StoreError> {
        sqlx::query_as::<_, DbStrategy>(
            "SELECT version, document FROM strategies WHERE market = $1 ORDER BY created_at, id",
        )
        .bind(market.as_str())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(DbStrategy::into_strategy)
        .collect()
    }

    async fn all_strategies(&self) -> Result<Vec<Strategy>, StoreError> {
        sqlx::query_as::<_, DbStrategy>(
            "SELECT version, document FROM strategies ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(DbStrategy::into_strategy)
        .collect()
    }

    async fn active_strategy(&self, market: &MarketId) -> Result<Option<Strategy>, StoreError> {
        sqlx::query_as::<_, DbStrategy>(
            "SELECT version, document FROM strategies WHERE market = $1 AND status = $2",
        )
        .bind(market.as_str())
        .bind(StrategyStatus::Active.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(DbStrategy::into_strategy)
        .transpose()
    }

    async fn apply_transitions(&self, changes: &[LifecycleChange]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for change in changes {
            Self::write_strategy(&mut tx, &change.strategy, change.expected_version).await?;
            let audit = &change.audit;
            sqlx::query(
                r#"
                INSERT INTO transition_audits (id, strategy_id, market, from_status, to_status, actor, reason, at, document)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(audit.id)
            .bind(audit.strategy_id)
            .bind(audit.market.as_str())
            .bind(audit.from.as_str())
            .bind(audit.to.as_str())
            .bind(&audit.actor)
            .bind(serde_json::to_value(audit.reason)?)
            .bind(audit.at)
            .bind(serde_json::to_value(audit)?)
            .execute(&mut *tx)
            .await?;
        }
        // Dropping an uncommitted transaction rolls it back.
        tx.commit().await?;
        debug!(changes = changes.len(), "Applied lifecycle transitions");
        Ok(())
    }

    async fn save_progress(
        &self,
        strategy: &Strategy,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM strategies WHERE id = $1 FOR UPDATE")
                .bind(strategy.id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(status) = status else {
            return Err(StoreError::NotFound(format!("strategy {}", strategy.id)));
        };
        if status != strategy.status().as_str() {
            return Err(StoreError::MissingAudit);
        }
        Self::write_strategy(&mut tx, strategy, expected_version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn audits(&self, market: &MarketId) -> Result<Vec<TransitionAudit>, StoreError> {
        let rows = sqlx::query(
            "SELECT document FROM transition_audits WHERE market = $1 ORDER BY at, id",
        )
        .bind(market.as_str())
        .fetch_all(&self.pool)
        .await?;
        documents(rows)
    }
}

#[async_trait]
impl TraceStore for DbRepository {
    async fn save_trace(&self, trace: &DecisionTrace) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO decision_traces (trace_id, market, match_id, strategy_id, policy_version, path, reason, decided_at, document)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(trace.trace_id)
        .bind(trace.market.as_str())
        .bind(&trace.match_id)
        .bind(trace.strategy_id)
        .bind(trace.policy_version as i64)
        .bind(serde_json::to_value(trace.path)?)
        .bind(trace.outcome.reason().as_str())
        .bind(trace.decided_at)
        .bind(serde_json::to_value(trace)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn traces_for_market(
        &self,
        market: &MarketId,
        limit: usize,
    ) -> Result<Vec<DecisionTrace>, StoreError> {
        let rows = sqlx::query(
            "SELECT document FROM decision_traces WHERE market = $1 ORDER BY decided_at DESC LIMIT $2",
        )
        .bind(market.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        documents(rows)
    }
}

#[async_trait]
impl SnapshotStore for DbRepository {
    async fn save_snapshots(&self, snapshots: &[CalibrationSnapshot]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for snapshot in snapshots {
            sqlx::query(
                r#"
                INSERT INTO calibration_snapshots (id, market, anchor, source, computed_at, document)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (market, anchor, source) DO UPDATE
                SET id = EXCLUDED.id, computed_at = EXCLUDED.computed_at, document = EXCLUDED.document
                "#,
            )
            .bind(snapshot.id)
            .bind(snapshot.market.as_str())
            .bind(snapshot.anchor)
            .bind(snapshot.source.as_str())
            .bind(snapshot.computed_at)
            .bind(serde_json::to_value(snapshot)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn snapshots(&self, market: &MarketId) -> Result<Vec<CalibrationSnapshot>, StoreError> {
        let rows = sqlx::query(
            "SELECT document FROM calibration_snapshots WHERE market = $1 ORDER BY anchor, source",
        )
        .bind(market.as_str())
        .fetch_all(&self.pool)
        .await?;
        documents(rows)
    }

    async fn latest_snapshot(
        &self,
        market: &MarketId,
        at: NaiveDate,
    ) -> Result<Option<CalibrationSnapshot>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT document FROM calibration_snapshots
            WHERE market = $1 AND anchor <= $2
            ORDER BY anchor DESC, computed_at DESC
            LIMIT 1
            "#,
        )
        .bind(market.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| -> Result<CalibrationSnapshot, StoreError> {
            Ok(serde_json::from_value(row.try_get::<JsonValue, _>("document")?)?)
        })
        .transpose()
    }

    async fn clear_retroactive(&self, markets: &[MarketId]) -> Result<u64, StoreError> {
        let names: Vec<String> = markets.iter().map(|m| m.0.clone()).collect();
        let result = sqlx::query(
            "DELETE FROM calibration_snapshots WHERE source = $1 AND market = ANY($2)",
        )
        .bind(SnapshotSource::Retroactive.as_str())
        .bind(names)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PolicyStore for DbRepository {
    async fn current_policy(&self) -> Result<PolicySnapshot, StoreError> {
        let row = sqlx::query(
            "SELECT version, document FROM policy_versions ORDER BY version DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => {
                let version: i64 = row.try_get("version")?;
                let values = serde_json::from_value(row.try_get::<JsonValue, _>("document")?)?;
                Ok(PolicySnapshot::new(version as u64, values))
            }
            None => Ok(PolicySnapshot::new(0, self.seed_policy.clone())),
        }
    }

    async fn update_policy(
        &self,
        key: &str,
        value: JsonValue,
        actor: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<PolicySnapshot, StoreError> {
        let current = self.current_policy().await?;
        let old_value = current.values.get(key)?;
        let values = current.values.with_value(key, value.clone())?;
        let next = PolicySnapshot::new(current.version + 1, values);

        let mut tx = self.pool.begin().await?;
        // The primary key on `version` rejects a concurrent writer that read
        // the same snapshot.
        sqlx::query("INSERT INTO policy_versions (version, document, created_at) VALUES ($1, $2, $3)")
            .bind(next.version as i64)
            .bind(serde_json::to_value(&next.values)?)
            .bind(at)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO policy_audit (version, key, old_value, new_value, actor, reason, at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(next.version as i64)
        .bind(key.to_ascii_uppercase())
        .bind(old_value)
        .bind(value)
        .bind(actor)
        .bind(reason)
        .bind(at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(next)
    }

    async fn policy_history(&self) -> Result<Vec<PolicyAudit>, StoreError> {
        let rows = sqlx::query(
            "SELECT version, key, old_value, new_value, actor, reason, at FROM policy_audit ORDER BY version",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| -> Result<PolicyAudit, StoreError> {
                Ok(PolicyAudit {
                    version: row.try_get::<i64, _>("version")? as u64,
                    key: row.try_get("key")?,
                    old_value: row.try_get("old_value")?,
                    new_value: row.try_get("new_value")?,
                    actor: row.try_get("actor")?,
                    reason: row.try_get("reason")?,
                    at: row.try_get("at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl OverrideStore for DbRepository {
    async fn add_override(&self, market_override: &MarketOverride) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO market_overrides (id, market, starts_at, ends_at, reason, actor)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(market_override.id)
        .bind(market_override.market.as_str())
        .bind(market_override.starts_at)
        .bind(market_override.ends_at)
        .bind(&market_override.reason)
        .bind(&market_override.actor)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn overrides(&self, market: &MarketId) -> Result<Vec<MarketOverride>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, market, starts_at, ends_at, reason, actor FROM market_overrides WHERE market = $1 ORDER BY starts_at",
        )
        .bind(market.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| -> Result<MarketOverride, StoreError> {
                Ok(MarketOverride {
                    id: row.try_get("id")?,
                    market: MarketId::new(row.try_get::<String, _>("market")?),
                    starts_at: row.try_get("starts_at")?,
                    ends_at: row.try_get("ends_at")?,
                    reason: row.try_get("reason")?,
                    actor: row.try_get("actor")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl OutcomeSource for DbRepository {
    async fn fetch_history(
        &self,
        market: &MarketId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MatchRecord>, SourceError> {
        let rows = sqlx::query(
            r#"
            SELECT document FROM match_records
            WHERE market = $1 AND kickoff >= $2 AND kickoff < $3
            ORDER BY kickoff ASC
            "#,
        )
        .bind(market.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SourceError::from(StoreError::from(e)))?;
        Ok(documents(rows)?)
    }

    async fn markets(&self) -> Result<Vec<MarketId>, SourceError> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT market FROM match_records ORDER BY market")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| SourceError::from(StoreError::from(e)))?;
        Ok(names.into_iter().map(MarketId::new).collect())
    }
}
