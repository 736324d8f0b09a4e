use core_types::FitnessTerms;

/// The three objectives final selection trades off.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Objectives {
    pub roi: f64,
    pub sharpe: f64,
    pub drawdown: f64,
}

impl From<&FitnessTerms> for Objectives {
    fn from(terms: &FitnessTerms) -> Self {
        Self {
            roi: terms.roi,
            sharpe: terms.sharpe,
            drawdown: terms.max_drawdown,
        }
    }
}

impl Objectives {
    /// At least as good on every objective and strictly better on one.
    pub fn dominates(&self, other: &Objectives) -> bool {
        let no_worse =
            self.roi >= other.roi && self.sharpe >= other.sharpe && self.drawdown <= other.drawdown;
        let better =
            self.roi > other.roi || self.sharpe > other.sharpe || self.drawdown < other.drawdown;
        no_worse && better
    }
}

/// Indices of the non-dominated points, in input order.
pub fn pareto_front(points: &[Objectives]) -> Vec<usize> {
    (0..points.len())
        .filter(|&i| !points.iter().any(|other| other.dominates(&points[i])))
        .collect()
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| (min.min(v), max.max(v)))
}

fn normalize(value: f64, min: f64, max: f64) -> f64 {
    if max - min <= f64::EPSILON {
        return 1.0;
    }
    (value - min) / (max - min)
}

/// The front member closest to the ideal point (best ROI, best Sharpe,
/// lowest drawdown) after min-max normalizing each objective over the front.
/// Ties go to the earlier index.
pub fn compromise(points: &[Objectives], front: &[usize]) -> Option<usize> {
    let (min_roi, max_roi) = min_max(front.iter().map(|&i| points[i].roi));
    let (min_sharpe, max_sharpe) = min_max(front.iter().map(|&i| points[i].sharpe));
    let (min_dd, max_dd) = min_max(front.iter().map(|&i| points[i].drawdown));

    let distance = |p: &Objectives| {
        let roi_gap = 1.0 - normalize(p.roi, min_roi, max_roi);
        let sharpe_gap = 1.0 - normalize(p.sharpe, min_sharpe, max_sharpe);
        // A flat drawdown column normalizes to 1; treat that as no gap.
        let dd_gap = if max_dd - min_dd <= f64::EPSILON {
            0.0
        } else {
            normalize(p.drawdown, min_dd, max_dd)
        };
        (roi_gap * roi_gap + sharpe_gap * sharpe_gap + dd_gap * dd_gap).sqrt()
    };

    front.iter().copied().fold(None, |best: Option<(usize, f64)>, i| {
        let d = distance(&points[i]);
        match best {
            Some((_, best_d)) if best_d <= d => best,
            _ => Some((i, d)),
        }
    })
    .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(roi: f64, sharpe: f64, drawdown: f64) -> Objectives {
        Objectives {
            roi,
            sharpe,
            drawdown,
        }
    }

    #[test]
    fn dominated_points_leave_the_front() {
        let points = [
            obj(0.10, 1.0, 0.20),
            obj(0.05, 0.5, 0.30), // dominated by 0
            obj(0.20, 0.4, 0.25),
            obj(0.02, 1.2, 0.05),
        ];
        assert_eq!(pareto_front(&points), vec![0, 2, 3]);
    }

    #[test]
    fn compromise_avoids_single_metric_extremes() {
        let points = [
            obj(0.30, 0.1, 0.60), // best ROI, poor elsewhere
            obj(0.15, 0.9, 0.15), // balanced
            obj(0.01, 1.0, 0.05), // safest, barely profitable
        ];
        let front = pareto_front(&points);
        assert_eq!(front.len(), 3);
        assert_eq!(compromise(&points, &front), Some(1));
    }

    #[test]
    fn empty_front_has_no_compromise() {
        assert_eq!(compromise(&[], &[]), None);
    }
}
