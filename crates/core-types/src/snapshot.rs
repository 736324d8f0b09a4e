use crate::enums::{Cadence, SnapshotSource};
use crate::genes::MarketId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a snapshot was computed for its own window or filled in from an
/// earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum SnapshotOrigin {
    Direct,
    CarriedForward { from_anchor: NaiveDate },
}

/// Reliability of one confidence bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBucket {
    pub lower: f64,
    pub upper: f64,
    pub samples: usize,
    pub mean_confidence: f64,
    pub hit_rate: f64,
}

/// A point-in-time calibration view of one market, anchored at a calendar
/// month boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSnapshot {
    pub id: Uuid,
    pub market: MarketId,
    pub anchor: NaiveDate,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub source: SnapshotSource,
    pub origin: SnapshotOrigin,
    pub cadence: Cadence,
    pub script_version: String,
    pub sample_count: usize,
    pub weighted_samples: f64,
    pub ece: Option<f64>,
    pub brier: Option<f64>,
    /// `1 - ece`, or zero when nothing could be measured.
    pub reliability_score: f64,
    pub buckets: Vec<CalibrationBucket>,
    pub computed_at: DateTime<Utc>,
}

impl CalibrationSnapshot {
    pub fn is_authoritative(&self) -> bool {
        matches!(self.origin, SnapshotOrigin::Direct)
    }
}
