//! Bootstrap and Monte-Carlo path kernels. Both are pure functions of the
//! bets and the generator state.

use analytics::SettledBet;
use analytics::stats::{mean, percentile_sorted};
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Stake and profit of one bet, as fractions of the bankroll, with the
/// bet's time-decay weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetReturn {
    pub stake: f64,
    pub profit: f64,
    pub weight: f64,
}

impl From<&SettledBet> for BetReturn {
    fn from(bet: &SettledBet) -> Self {
        Self {
            stake: bet.stake,
            profit: bet.profit,
            weight: bet.weight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BootstrapSummary {
    pub prob_positive: f64,
    pub roi_mean: f64,
    pub ci_low: f64,
    pub ci_high: f64,
}

/// Decay-weighted ROI of a resample: `Σ w·profit / Σ w·stake`.
fn roi_of(bets: &[BetReturn], indices: &[usize]) -> f64 {
    let (profit, stake) = indices.iter().fold((0.0, 0.0), |(p, s), &i| {
        let bet = &bets[i];
        (p + bet.weight * bet.profit, s + bet.weight * bet.stake)
    });
    if stake > 0.0 { profit / stake } else { 0.0 }
}

/// ROI distribution by resampling bets with replacement. Resample indices are
/// drawn a batch at a time into one flat buffer.
pub fn bootstrap_roi(
    bets: &[BetReturn],
    samples: usize,
    batch: usize,
    ci_level: f64,
    rng: &mut StdRng,
) -> BootstrapSummary {
    let n = bets.len();
    if n == 0 || samples == 0 {
        return BootstrapSummary {
            prob_positive: 0.0,
            roi_mean: 0.0,
            ci_low: 0.0,
            ci_high: 0.0,
        };
    }

    let batch = batch.max(1);
    let mut rois = Vec::with_capacity(samples);
    let mut buffer: Vec<usize> = Vec::with_capacity(batch * n);
    while rois.len() < samples {
        let this_batch = batch.min(samples - rois.len());
        buffer.clear();
        buffer.extend((0..this_batch * n).map(|_| rng.gen_range(0..n)));
        rois.extend(buffer.chunks(n).map(|indices| roi_of(bets, indices)));
    }

    let positive = rois.iter().filter(|r| **r > 0.0).count();
    let roi_mean = mean(&rois);
    rois.sort_by(f64::total_cmp);
    let tail = (1.0 - ci_level.clamp(0.0, 1.0)) / 2.0;
    BootstrapSummary {
        prob_positive: positive as f64 / samples as f64,
        roi_mean,
        ci_low: percentile_sorted(&rois, tail),
        ci_high: percentile_sorted(&rois, 1.0 - tail),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathSummary {
    pub ruin_probability: f64,
    pub drawdown_median: f64,
    pub drawdown_p95: f64,
    pub early_terminated: usize,
}

/// Replays the bets in shuffled order with a compounding bankroll of one.
/// Each bet moves the bankroll at its decay weight.
///
/// A path stops as soon as the bankroll falls to `1 - ruin_level`; its
/// drawdown at that point already exceeds the ruin level, so finishing it
/// cannot change the verdict.
pub fn shuffled_paths(
    bets: &[BetReturn],
    paths: usize,
    stake_scale: f64,
    ruin_level: f64,
    rng: &mut StdRng,
) -> PathSummary {
    if bets.is_empty() || paths == 0 {
        return PathSummary {
            ruin_probability: 0.0,
            drawdown_median: 0.0,
            drawdown_p95: 0.0,
            early_terminated: 0,
        };
    }

    let ruin_bankroll = 1.0 - ruin_level;
    let mut order: Vec<usize> = (0..bets.len()).collect();
    let mut drawdowns = Vec::with_capacity(paths);
    let mut ruined = 0usize;
    let mut early_terminated = 0usize;

    for _ in 0..paths {
        order.shuffle(rng);
        let mut bankroll = 1.0_f64;
        let mut peak = 1.0_f64;
        let mut worst = 0.0_f64;

        for (step, &i) in order.iter().enumerate() {
            bankroll *= 1.0 + stake_scale * bets[i].weight * bets[i].profit;
            peak = peak.max(bankroll);
            worst = worst.max((peak - bankroll) / peak);
            if bankroll <= ruin_bankroll {
                ruined += 1;
                if step + 1 < order.len() {
                    early_terminated += 1;
                }
                break;
            }
        }
        drawdowns.push(worst);
    }

    drawdowns.sort_by(f64::total_cmp);
    PathSummary {
        ruin_probability: ruined as f64 / paths as f64,
        drawdown_median: percentile_sorted(&drawdowns, 0.5),
        drawdown_p95: percentile_sorted(&drawdowns, 0.95),
        early_terminated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn bets(pattern: &[f64], stake: f64) -> Vec<BetReturn> {
        pattern
            .iter()
            .map(|&r| BetReturn {
                stake,
                profit: stake * r,
                weight: 1.0,
            })
            .collect()
    }

    /// 60 old wins at the decay floor, then 40 recent bets of which a
    /// quarter won, all at even money.
    fn stale_wins_recent_losses(recent_weight: f64, old_weight: f64) -> Vec<BetReturn> {
        let stake = 0.02;
        let old = (0..60).map(|_| BetReturn {
            stake,
            profit: stake,
            weight: old_weight,
        });
        let recent = (0..40).map(|i| BetReturn {
            stake,
            profit: if i % 4 == 0 { stake } else { -stake },
            weight: recent_weight,
        });
        old.chain(recent).collect()
    }

    #[test]
    fn bootstrap_brackets_the_sample_roi() {
        let sample = bets(&[1.2, 1.2, -1.0, 1.2, -1.0].repeat(12), 0.02);
        let mut rng = StdRng::seed_from_u64(1);
        let summary = bootstrap_roi(&sample, 500, 64, 0.95, &mut rng);
        assert!(summary.ci_low < 0.32 && 0.32 < summary.ci_high);
        assert!(summary.prob_positive > 0.9);
    }

    #[test]
    fn bootstrap_follows_the_decay_weights() {
        let mut rng = StdRng::seed_from_u64(11);
        let unweighted = bootstrap_roi(&stale_wins_recent_losses(1.0, 1.0), 500, 64, 0.95, &mut rng);
        assert!((unweighted.roi_mean - 0.4).abs() < 0.05);

        // Σw·profit / Σw·stake = (12 - 20) / 52.
        let mut rng = StdRng::seed_from_u64(11);
        let weighted = bootstrap_roi(&stale_wins_recent_losses(1.0, 0.2), 500, 64, 0.95, &mut rng);
        assert!((weighted.roi_mean + 8.0 / 52.0).abs() < 0.05);
        assert!(weighted.ci_low < -0.15 && -0.15 < weighted.ci_high);
        assert!(weighted.ci_high < unweighted.ci_low);
        assert!(weighted.prob_positive < 0.5);
    }

    #[test]
    fn stale_bets_move_paths_less() {
        let mut heavy = bets(&[-1.0; 20], 0.05);
        let mut rng = StdRng::seed_from_u64(3);
        let full = shuffled_paths(&heavy, 20, 1.0, 0.9, &mut rng);
        for bet in &mut heavy {
            bet.weight = 0.2;
        }
        let mut rng = StdRng::seed_from_u64(3);
        let faded = shuffled_paths(&heavy, 20, 1.0, 0.9, &mut rng);
        assert!(faded.drawdown_median < full.drawdown_median);
    }

    #[test]
    fn partial_batches_still_fill_the_sample_count() {
        let sample = bets(&[1.0, -1.0], 0.01);
        let mut a = StdRng::seed_from_u64(4);
        let mut b = StdRng::seed_from_u64(4);
        let odd = bootstrap_roi(&sample, 101, 10, 0.9, &mut a);
        let whole = bootstrap_roi(&sample, 101, 200, 0.9, &mut b);
        // Same draws in the same order, however they are batched.
        assert_eq!(odd, whole);
    }

    #[test]
    fn ruinous_paths_stop_early() {
        let sample = bets(&[-1.0; 10], 0.3);
        let mut rng = StdRng::seed_from_u64(2);
        let summary = shuffled_paths(&sample, 50, 1.0, 0.5, &mut rng);
        assert_eq!(summary.ruin_probability, 1.0);
        assert_eq!(summary.early_terminated, 50);
        assert!(summary.drawdown_median >= 0.5);
    }
}
