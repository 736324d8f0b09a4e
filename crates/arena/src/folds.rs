use chrono::NaiveDate;
use core_types::MatchRecord;

/// Settled records split into a training window and the most recent
/// validation window.
#[derive(Debug, Clone)]
pub struct Holdout {
    pub training: Vec<MatchRecord>,
    pub validation: Vec<MatchRecord>,
}

/// Sorts the settled records by kickoff and holds out the latest
/// `fraction` of them. Training always keeps at least one record.
pub fn holdout(records: &[MatchRecord], fraction: f64) -> Holdout {
    let mut settled: Vec<MatchRecord> = records.iter().filter(|r| r.is_settled()).cloned().collect();
    settled.sort_by(|a, b| a.kickoff.cmp(&b.kickoff).then_with(|| a.match_id.cmp(&b.match_id)));

    let held = ((settled.len() as f64) * fraction.clamp(0.0, 1.0)).round() as usize;
    let cut = settled.len().saturating_sub(held).max(1).min(settled.len());
    let validation = settled.split_off(cut);
    Holdout {
        training: settled,
        validation,
    }
}

/// Splits records (already in kickoff order) into `k` contiguous time folds.
/// Fewer folds come back when there are fewer records than `k`.
pub fn time_folds(records: &[MatchRecord], k: usize) -> Vec<&[MatchRecord]> {
    if records.is_empty() || k == 0 {
        return Vec::new();
    }
    let size = records.len().div_ceil(k);
    records.chunks(size).collect()
}

/// First and last kickoff dates of a window.
pub fn window_of(records: &[MatchRecord]) -> Option<(NaiveDate, NaiveDate)> {
    let first = records.iter().map(|r| r.kickoff).min()?;
    let last = records.iter().map(|r| r.kickoff).max()?;
    Some((first.date_naive(), last.date_naive()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use core_types::MarketId;
    use core_types::fixtures::synthetic_history;

    #[test]
    fn validation_is_the_most_recent_slice() {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 15, 0, 0).unwrap();
        let mut records = synthetic_history(&MarketId::new("EPL"), start, 100, 24, 5);
        records.reverse();

        let split = holdout(&records, 0.2);
        assert_eq!(split.training.len(), 80);
        assert_eq!(split.validation.len(), 20);
        let last_train = split.training.last().unwrap().kickoff;
        assert!(split.validation.iter().all(|r| r.kickoff > last_train));
    }

    #[test]
    fn folds_cover_every_record_in_order() {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 15, 0, 0).unwrap();
        let records = synthetic_history(&MarketId::new("EPL"), start, 10, 24, 5);
        let folds = time_folds(&records, 4);
        assert_eq!(folds.len(), 4);
        assert_eq!(folds.iter().map(|f| f.len()).sum::<usize>(), 10);
        assert_eq!(folds[0][0].match_id, records[0].match_id);
    }
}
