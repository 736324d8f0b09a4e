//! The metric gates a shadow strategy must clear before going live, and the
//! rolling drift test an active strategy must keep passing.

use configuration::PolicyValues;
use core_types::{Lifecycle, StrategyStatus, Strategy, TipOutcome};
use serde::Serialize;
use thiserror::Error;

/// One reason a shadow strategy may not be promoted.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "blocker", rename_all = "snake_case")]
pub enum PromotionBlocker {
    #[error("strategy is {status}, not shadow")]
    NotShadow { status: StrategyStatus },

    #[error("{tips} shadow tips recorded, {required} required")]
    TooFewTips { tips: u32, required: u32 },

    #[error("shadow ROI {realized:.4} drifts {drift:.4} from validation ROI {validation:.4} (max {max:.4})")]
    RoiDrift {
        realized: f64,
        validation: f64,
        drift: f64,
        max: f64,
    },

    #[error("expected ROI {expected:.4} is below the floor {floor:.4}")]
    ExpectedRoiBelowFloor { expected: f64, floor: f64 },

    #[error("no passing finalist stress test on record")]
    StressNotPassed,
}

/// Every blocker standing between `strategy` and activation. Empty means the
/// strategy may be promoted.
pub fn promotion_blockers(strategy: &Strategy, policy: &PolicyValues) -> Vec<PromotionBlocker> {
    let Lifecycle::Shadow(shadow) = &strategy.lifecycle else {
        return vec![PromotionBlocker::NotShadow {
            status: strategy.status(),
        }];
    };

    let mut blockers = Vec::new();
    if shadow.tips < policy.shadow_min_tips {
        blockers.push(PromotionBlocker::TooFewTips {
            tips: shadow.tips,
            required: policy.shadow_min_tips,
        });
    }

    let realized = shadow.realized_roi();
    let validation = strategy.validation.roi;
    let drift = (realized - validation).abs();
    if drift > policy.promotion_max_roi_drift {
        blockers.push(PromotionBlocker::RoiDrift {
            realized,
            validation,
            drift,
            max: policy.promotion_max_roi_drift,
        });
    }

    let expected = shadow.expected_roi();
    if expected < policy.promotion_min_expected_roi {
        blockers.push(PromotionBlocker::ExpectedRoiBelowFloor {
            expected,
            floor: policy.promotion_min_expected_roi,
        });
    }

    if !strategy.stress_passed() {
        blockers.push(PromotionBlocker::StressNotPassed);
    }
    blockers
}

/// Realized against expected return over a window of live tips.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DriftReading {
    pub tips: usize,
    pub realized_roi: f64,
    pub expected_roi: f64,
    pub divergence: f64,
}

impl DriftReading {
    pub fn over(tips: &[TipOutcome]) -> Self {
        let staked: f64 = tips.iter().map(|t| t.stake).sum();
        let ratio = |sum: f64| if staked > 0.0 { sum / staked } else { 0.0 };
        let realized_roi = ratio(tips.iter().map(|t| t.realized_return).sum());
        let expected_roi = ratio(tips.iter().map(|t| t.expected_return).sum());
        Self {
            tips: tips.len(),
            realized_roi,
            expected_roi,
            divergence: (realized_roi - expected_roi).abs(),
        }
    }

    /// A full window whose divergence exceeds the policy ceiling.
    pub fn breaches(&self, policy: &PolicyValues) -> bool {
        self.tips >= policy.drift_window_tips && self.divergence > policy.drift_max_divergence
    }
}

/// Appends `tip` and keeps only the most recent `window` tips.
pub fn push_bounded(recent: &mut Vec<TipOutcome>, tip: TipOutcome, window: usize) {
    recent.push(tip);
    if recent.len() > window {
        let excess = recent.len() - window;
        recent.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn tip(stake: f64, expected: f64, realized: f64) -> TipOutcome {
        TipOutcome {
            settled_at: Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap(),
            stake,
            expected_return: expected,
            realized_return: realized,
        }
    }

    #[test]
    fn drift_needs_a_full_window() {
        let policy = PolicyValues {
            drift_window_tips: 4,
            drift_max_divergence: 0.10,
            ..PolicyValues::default()
        };
        let losing: Vec<TipOutcome> = (0..3).map(|_| tip(1.0, 0.05, -1.0)).collect();
        let reading = DriftReading::over(&losing);
        assert!(reading.divergence > 1.0);
        assert!(!reading.breaches(&policy));

        let losing: Vec<TipOutcome> = (0..4).map(|_| tip(1.0, 0.05, -1.0)).collect();
        assert!(DriftReading::over(&losing).breaches(&policy));
    }

    #[test]
    fn window_keeps_the_newest_tips() {
        let mut recent = Vec::new();
        for i in 0..6 {
            push_bounded(&mut recent, tip(1.0, 0.0, i as f64), 4);
        }
        let realized: Vec<f64> = recent.iter().map(|t| t.realized_return).collect();
        assert_eq!(realized, vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn empty_windows_read_zero() {
        let reading = DriftReading::over(&[]);
        assert_eq!(reading.tips, 0);
        assert_eq!(reading.divergence, 0.0);
    }
}
