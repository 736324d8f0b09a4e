//! Policy values: the named thresholds every decision and promotion reads.
//!
//! Operational keys are upper-case (`SHADOW_MIN_TIPS`, `MAX_XG_PER_TEAM`,
//! ...). A [`PolicySnapshot`] pairs one immutable set of values with the
//! version it was read at; callers hold it for the whole of one decision.

use crate::error::ConfigError;
use core_types::MarketId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Whether a stage that cannot pass blocks the decision or continues with a
/// recorded warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageMode {
    FailClosed,
    FailOpen,
}

/// What the sanity stage does with an out-of-bounds modeled quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanityAction {
    Block,
    Quarantine,
    AllowWithWarning,
}

/// What the conservation guard does when probabilities do not sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConservationMode {
    FailClosed,
    Renormalize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyValues {
    // Promotion
    #[serde(rename = "SHADOW_MIN_TIPS", alias = "shadow_min_tips")]
    pub shadow_min_tips: u32,
    #[serde(rename = "PROMOTION_MAX_ROI_DRIFT", alias = "promotion_max_roi_drift")]
    pub promotion_max_roi_drift: f64,
    #[serde(rename = "PROMOTION_MIN_EXPECTED_ROI", alias = "promotion_min_expected_roi")]
    pub promotion_min_expected_roi: f64,

    // Drift rollback
    #[serde(rename = "DRIFT_WINDOW_TIPS", alias = "drift_window_tips")]
    pub drift_window_tips: usize,
    #[serde(rename = "DRIFT_MAX_DIVERGENCE", alias = "drift_max_divergence")]
    pub drift_max_divergence: f64,
    #[serde(rename = "RETRAIN_COOLDOWN_HOURS", alias = "retrain_cooldown_hours")]
    pub retrain_cooldown_hours: i64,

    // Stress pass thresholds
    #[serde(rename = "STRESS_MIN_BETS", alias = "stress_min_bets")]
    pub stress_min_bets: usize,
    #[serde(rename = "STRESS_MIN_PROB_POSITIVE", alias = "stress_min_prob_positive")]
    pub stress_min_prob_positive: f64,
    #[serde(rename = "STRESS_MAX_RUIN", alias = "stress_max_ruin")]
    pub stress_max_ruin: f64,
    #[serde(rename = "STRESS_MAX_DRAWDOWN_P95", alias = "stress_max_drawdown_p95")]
    pub stress_max_drawdown_p95: f64,

    // Strategy application
    #[serde(rename = "REGIME_SPLIT", alias = "regime_split")]
    pub regime_split: f64,

    // Input sanity
    #[serde(rename = "MAX_XG_PER_TEAM", alias = "max_xg_per_team")]
    pub max_xg_per_team: f64,
    #[serde(rename = "MIN_SANE_ODDS", alias = "min_sane_odds")]
    pub min_sane_odds: f64,
    #[serde(rename = "MAX_SANE_ODDS", alias = "max_sane_odds")]
    pub max_sane_odds: f64,
    #[serde(rename = "SANITY_ACTION", alias = "sanity_action")]
    pub sanity_action: SanityAction,
    #[serde(rename = "PROBABILITY_CONSERVATION", alias = "probability_conservation")]
    pub probability_conservation: ConservationMode,
    #[serde(rename = "PROBABILITY_TOLERANCE", alias = "probability_tolerance")]
    pub probability_tolerance: f64,

    // Core risk
    #[serde(rename = "JUSTICE_FLOOR", alias = "justice_floor")]
    pub justice_floor: f64,
    #[serde(rename = "DATA_QUALITY_FLOOR", alias = "data_quality_floor")]
    pub data_quality_floor: f64,
    #[serde(rename = "CORE_RISK_MODE", alias = "core_risk_mode")]
    pub core_risk_mode: StageMode,

    // Auxiliary signals
    #[serde(rename = "AUX_SIGNAL_MODE", alias = "aux_signal_mode")]
    pub aux_signal_mode: StageMode,
    #[serde(rename = "INFERENCE_DRIFT_CEILING", alias = "inference_drift_ceiling")]
    pub inference_drift_ceiling: f64,

    // Guardrails
    #[serde(rename = "CONFIDENCE_FLOOR", alias = "confidence_floor")]
    pub confidence_floor: f64,
    #[serde(rename = "MAX_PLAUSIBLE_ODDS", alias = "max_plausible_odds")]
    pub max_plausible_odds: f64,
    #[serde(rename = "MAX_PLAUSIBLE_EDGE", alias = "max_plausible_edge")]
    pub max_plausible_edge: f64,
    #[serde(rename = "MAX_PLAUSIBLE_STAKE", alias = "max_plausible_stake")]
    pub max_plausible_stake: f64,
}

impl Default for PolicyValues {
    fn default() -> Self {
        Self {
            shadow_min_tips: 50,
            promotion_max_roi_drift: 0.05,
            promotion_min_expected_roi: 0.0,
            drift_window_tips: 30,
            drift_max_divergence: 0.10,
            retrain_cooldown_hours: 72,
            stress_min_bets: 30,
            stress_min_prob_positive: 0.60,
            stress_max_ruin: 0.05,
            stress_max_drawdown_p95: 0.35,
            regime_split: 0.30,
            max_xg_per_team: 8.0,
            min_sane_odds: 1.01,
            max_sane_odds: 1000.0,
            sanity_action: SanityAction::Block,
            probability_conservation: ConservationMode::FailClosed,
            probability_tolerance: 1e-6,
            justice_floor: 0.55,
            data_quality_floor: 0.60,
            core_risk_mode: StageMode::FailClosed,
            aux_signal_mode: StageMode::FailOpen,
            inference_drift_ceiling: 0.15,
            confidence_floor: 0.50,
            max_plausible_odds: 15.0,
            max_plausible_edge: 0.50,
            max_plausible_stake: 0.05,
        }
    }
}

impl PolicyValues {
    fn as_map(&self) -> Result<Map<String, Value>, ConfigError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(ConfigError::ValidationError(
                "policy values did not serialise to a map".to_string(),
            )),
            Err(e) => Err(ConfigError::ValidationError(e.to_string())),
        }
    }

    /// All operational key names, sorted.
    pub fn keys(&self) -> Result<Vec<String>, ConfigError> {
        Ok(self.as_map()?.keys().cloned().collect())
    }

    pub fn get(&self, key: &str) -> Result<Value, ConfigError> {
        let key = key.to_ascii_uppercase();
        self.as_map()?
            .remove(&key)
            .ok_or(ConfigError::UnknownPolicyKey(key))
    }

    /// Returns a copy with `key` set to `value`, rejecting unknown keys and
    /// values of the wrong shape.
    pub fn with_value(&self, key: &str, value: Value) -> Result<Self, ConfigError> {
        let key = key.to_ascii_uppercase();
        let mut map = self.as_map()?;
        if !map.contains_key(&key) {
            return Err(ConfigError::UnknownPolicyKey(key));
        }
        map.insert(key.clone(), value);
        serde_json::from_value(Value::Object(map)).map_err(|e| ConfigError::InvalidPolicyValue {
            key,
            message: e.to_string(),
        })
    }

    /// Applies several overrides at once.
    pub fn with_overrides(&self, overrides: &Map<String, Value>) -> Result<Self, ConfigError> {
        overrides
            .iter()
            .try_fold(self.clone(), |values, (key, value)| values.with_value(key, value.clone()))
    }

    /// Parses a raw CLI value: JSON when it parses, otherwise a bare string.
    pub fn parse_raw(raw: &str) -> Value {
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
    }
}

/// An immutable, versioned view of the policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub version: u64,
    pub values: PolicyValues,
}

impl PolicySnapshot {
    pub fn new(version: u64, values: PolicyValues) -> Self {
        Self { version, values }
    }
}

impl Default for PolicySnapshot {
    fn default() -> Self {
        Self::new(0, PolicyValues::default())
    }
}

/// The `[policy]` section: seed values for the policy store plus optional
/// per-market overrides applied on top of whatever the store holds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub defaults: PolicyValues,
    pub markets: BTreeMap<String, Map<String, Value>>,
}

impl PolicyConfig {
    /// The snapshot a decision on `market` should use, keeping the stored
    /// version number.
    pub fn for_market(
        &self,
        base: &PolicySnapshot,
        market: &MarketId,
    ) -> Result<PolicySnapshot, ConfigError> {
        match self.markets.get(market.as_str()) {
            Some(overrides) => Ok(PolicySnapshot::new(
                base.version,
                base.values.with_overrides(overrides)?,
            )),
            None => Ok(base.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_use_operational_names() {
        let keys = PolicyValues::default().keys().unwrap();
        assert!(keys.contains(&"SHADOW_MIN_TIPS".to_string()));
        assert!(keys.contains(&"MAX_XG_PER_TEAM".to_string()));
        assert!(keys.contains(&"JUSTICE_FLOOR".to_string()));
    }

    #[test]
    fn with_value_is_typed_and_case_insensitive() {
        let values = PolicyValues::default();
        let updated = values.with_value("shadow_min_tips", json!(60)).unwrap();
        assert_eq!(updated.shadow_min_tips, 60);
        assert_eq!(values.shadow_min_tips, 50);

        let mode = values.with_value("AUX_SIGNAL_MODE", json!("fail_closed")).unwrap();
        assert_eq!(mode.aux_signal_mode, StageMode::FailClosed);

        assert!(matches!(
            values.with_value("NOT_A_KEY", json!(1)),
            Err(ConfigError::UnknownPolicyKey(_))
        ));
        assert!(matches!(
            values.with_value("SHADOW_MIN_TIPS", json!("many")),
            Err(ConfigError::InvalidPolicyValue { .. })
        ));
    }

    #[test]
    fn parse_raw_falls_back_to_string() {
        assert_eq!(PolicyValues::parse_raw("8.5"), json!(8.5));
        assert_eq!(PolicyValues::parse_raw("renormalize"), json!("renormalize"));
    }

    #[test]
    fn market_overrides_keep_the_version() {
        let mut cfg = PolicyConfig::default();
        let mut overrides = Map::new();
        overrides.insert("MAX_XG_PER_TEAM".to_string(), json!(6.5));
        cfg.markets.insert("EPL".to_string(), overrides);

        let base = PolicySnapshot::new(4, PolicyValues::default());
        let epl = cfg.for_market(&base, &MarketId::new("EPL")).unwrap();
        assert_eq!(epl.version, 4);
        assert_eq!(epl.values.max_xg_per_team, 6.5);

        let other = cfg.for_market(&base, &MarketId::new("LIGA")).unwrap();
        assert_eq!(other, base);
    }
}
