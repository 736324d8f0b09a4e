use crate::anchors::months_before;
use crate::error::TimeMachineError;
use analytics::{CalibrationSample, decay_weight, expected_calibration_error};
use chrono::{DateTime, NaiveDate, Utc};
use core_types::{
    Cadence, CalibrationSnapshot, MarketId, MatchRecord, Outcome, SnapshotOrigin, SnapshotSource,
};
use uuid::Uuid;

/// Constants shared by every snapshot of one run.
#[derive(Debug, Clone)]
pub struct SnapshotParams {
    pub window_months: u32,
    pub decay_floor: f64,
    pub ece_buckets: usize,
    pub ece_min_bucket_n: usize,
    pub script_version: String,
    pub computed_at: DateTime<Utc>,
}

/// The model's favourite and whether it won, weighted by age within the
/// window. Records without a usable probability triple are skipped.
fn calibration_sample(
    record: &MatchRecord,
    anchor: NaiveDate,
    window_days: f64,
    decay_floor: f64,
) -> Option<CalibrationSample> {
    let result = record.result?;
    let probs = record.model_probs.normalized()?;
    let (favourite, confidence) = Outcome::ALL
        .iter()
        .map(|&o| (o, probs.get(o)))
        .fold((Outcome::Home, f64::MIN), |best, next| {
            if next.1 > best.1 { next } else { best }
        });
    let age_days = (anchor - record.kickoff.date_naive()).num_days() as f64;
    let age_fraction = if window_days > 0.0 { age_days / window_days } else { 0.0 };
    Some(CalibrationSample {
        confidence,
        hit: favourite == result,
        weight: decay_weight(age_fraction, decay_floor),
    })
}

/// Computes the snapshot at `anchor` from the records kicking off in the
/// trailing window `[anchor - window_months, anchor)`. Nothing at or after
/// the anchor is visible.
pub fn compute_snapshot(
    market: &MarketId,
    anchor: NaiveDate,
    records: &[MatchRecord],
    cadence: Cadence,
    params: &SnapshotParams,
) -> Result<CalibrationSnapshot, TimeMachineError> {
    let window_start = months_before(anchor, params.window_months)?;
    let window_days = (anchor - window_start).num_days() as f64;
    let samples: Vec<CalibrationSample> = records
        .iter()
        .filter(|r| {
            let day = r.kickoff.date_naive();
            day >= window_start && day < anchor
        })
        .filter_map(|r| calibration_sample(r, anchor, window_days, params.decay_floor))
        .collect();

    let report = expected_calibration_error(&samples, params.ece_buckets, params.ece_min_bucket_n);
    Ok(CalibrationSnapshot {
        id: Uuid::new_v4(),
        market: market.clone(),
        anchor,
        window_start,
        window_end: anchor,
        source: SnapshotSource::Retroactive,
        origin: SnapshotOrigin::Direct,
        cadence,
        script_version: params.script_version.clone(),
        sample_count: samples.len(),
        weighted_samples: report.as_ref().map_or(0.0, |r| r.weighted_samples),
        ece: report.as_ref().map(|r| r.ece),
        brier: report.as_ref().map(|r| r.brier),
        reliability_score: report.as_ref().map_or(0.0, |r| (1.0 - r.ece).clamp(0.0, 1.0)),
        buckets: report.map(|r| r.buckets).unwrap_or_default(),
        computed_at: params.computed_at,
    })
}

/// A filled-in snapshot for `anchor` that repeats the metrics of `source`
/// and records where they came from.
pub fn carry_forward(
    source: &CalibrationSnapshot,
    anchor: NaiveDate,
    cadence: Cadence,
    params: &SnapshotParams,
) -> Result<CalibrationSnapshot, TimeMachineError> {
    Ok(CalibrationSnapshot {
        id: Uuid::new_v4(),
        anchor,
        window_start: months_before(anchor, params.window_months)?,
        window_end: anchor,
        origin: SnapshotOrigin::CarriedForward {
            from_anchor: source.anchor,
        },
        cadence,
        script_version: params.script_version.clone(),
        computed_at: params.computed_at,
        ..source.clone()
    })
}
