use core_types::CalibrationBucket;
use serde::{Deserialize, Serialize};

/// One probability forecast and whether it came true.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSample {
    pub confidence: f64,
    pub hit: bool,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// Expected calibration error with small buckets shrunk toward their prior.
    pub ece: f64,
    /// The same error without smoothing.
    pub raw_ece: f64,
    pub brier: f64,
    pub sample_count: usize,
    pub weighted_samples: f64,
    pub buckets: Vec<CalibrationBucket>,
}

/// Expected Calibration Error over `bucket_count` equal-width confidence
/// buckets.
///
/// A bucket with `n < min_bucket_n` samples has its hit rate blended with a
/// pseudo-count prior equal to its own mean confidence, weighted
/// `min_bucket_n - n`. Its gap therefore shrinks by `n / min_bucket_n` and
/// vanishes as `n` approaches zero. Returns `None` when there are no samples.
pub fn expected_calibration_error(
    samples: &[CalibrationSample],
    bucket_count: usize,
    min_bucket_n: usize,
) -> Option<CalibrationReport> {
    let bucket_count = bucket_count.max(1);
    let total_weight: f64 = samples.iter().map(|s| s.weight).sum();
    if samples.is_empty() || total_weight <= 0.0 {
        return None;
    }

    // (count, weight, weighted confidence, weighted hits)
    let mut acc = vec![(0usize, 0.0f64, 0.0f64, 0.0f64); bucket_count];
    let mut brier = 0.0;
    for s in samples {
        let c = s.confidence.clamp(0.0, 1.0);
        let idx = ((c * bucket_count as f64) as usize).min(bucket_count - 1);
        let hit = if s.hit { 1.0 } else { 0.0 };
        let slot = &mut acc[idx];
        slot.0 += 1;
        slot.1 += s.weight;
        slot.2 += s.weight * c;
        slot.3 += s.weight * hit;
        brier += s.weight * (c - hit) * (c - hit);
    }

    let mut ece = 0.0;
    let mut raw_ece = 0.0;
    let mut buckets = Vec::new();
    for (idx, (count, weight, conf_sum, hit_sum)) in acc.into_iter().enumerate() {
        if count == 0 || weight <= 0.0 {
            continue;
        }
        let mean_conf = conf_sum / weight;
        let hit_rate = hit_sum / weight;
        let share = weight / total_weight;

        let raw_gap = (hit_rate - mean_conf).abs();
        let gap = if count < min_bucket_n {
            let n = count as f64;
            let k = (min_bucket_n - count) as f64;
            let smoothed_rate = (n * hit_rate + k * mean_conf) / (n + k);
            (smoothed_rate - mean_conf).abs()
        } else {
            raw_gap
        };

        raw_ece += share * raw_gap;
        ece += share * gap;
        buckets.push(CalibrationBucket {
            lower: idx as f64 / bucket_count as f64,
            upper: (idx + 1) as f64 / bucket_count as f64,
            samples: count,
            mean_confidence: mean_conf,
            hit_rate,
        });
    }

    Some(CalibrationReport {
        ece,
        raw_ece,
        brier: brier / total_weight,
        sample_count: samples.len(),
        weighted_samples: total_weight,
        buckets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(confidence: f64, hit: bool) -> CalibrationSample {
        CalibrationSample {
            confidence,
            hit,
            weight: 1.0,
        }
    }

    #[test]
    fn small_buckets_are_shrunk_by_their_sample_share() {
        // Five confident misses in one bucket: raw gap 0.9.
        let samples: Vec<_> = (0..5).map(|_| sample(0.9, false)).collect();
        let report = expected_calibration_error(&samples, 10, 20).unwrap();
        assert!((report.raw_ece - 0.9).abs() < 1e-12);
        assert!((report.ece - 0.9 * 5.0 / 20.0).abs() < 1e-12);
    }

    #[test]
    fn smoothing_difference_is_bounded() {
        for n in 1..=25usize {
            let samples: Vec<_> = (0..n).map(|i| sample(0.75, i % 4 == 0)).collect();
            let report = expected_calibration_error(&samples, 10, 20).unwrap();
            let diff = (report.raw_ece - report.ece).abs();
            let bound = report.raw_ece * (1.0 - (n as f64 / 20.0).min(1.0));
            assert!(diff <= bound + 1e-12, "n={n}: diff {diff} > bound {bound}");
            assert!(report.ece <= report.raw_ece + 1e-12);
            if n >= 20 {
                assert!((report.ece - report.raw_ece).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn tiny_buckets_lose_influence_as_n_falls() {
        let mut previous = f64::INFINITY;
        for n in (1..20usize).rev() {
            let samples: Vec<_> = (0..n).map(|_| sample(0.9, false)).collect();
            let report = expected_calibration_error(&samples, 10, 20).unwrap();
            assert!(report.ece < previous);
            previous = report.ece;
        }
        assert!(previous <= 0.9 / 20.0 + 1e-12);
    }

    #[test]
    fn perfectly_calibrated_large_bucket_scores_zero() {
        let samples: Vec<_> = (0..40).map(|i| sample(0.5, i % 2 == 0)).collect();
        let report = expected_calibration_error(&samples, 10, 20).unwrap();
        assert!(report.ece.abs() < 1e-12);
        assert!((report.brier - 0.25).abs() < 1e-12);
        assert_eq!(report.buckets.len(), 1);
        assert!(expected_calibration_error(&[], 10, 20).is_none());
    }
}
