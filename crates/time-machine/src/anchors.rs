//! Calendar arithmetic for snapshot anchors.

use crate::error::TimeMachineError;
use chrono::{Datelike, Months, NaiveDate};
use core_types::Cadence;

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> Result<NaiveDate, TimeMachineError> {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
        .ok_or_else(|| TimeMachineError::DateError(format!("no month start for {date}")))
}

pub fn months_before(date: NaiveDate, months: u32) -> Result<NaiveDate, TimeMachineError> {
    date.checked_sub_months(Months::new(months))
        .ok_or_else(|| TimeMachineError::DateError(format!("{date} minus {months} months")))
}

/// Every monthly anchor of the lookback, oldest first, ending with the
/// month that contains `as_of`.
pub fn monthly_anchors(
    as_of: NaiveDate,
    lookback_years: u32,
) -> Result<Vec<NaiveDate>, TimeMachineError> {
    let last = month_start(as_of)?;
    let count = lookback_years.max(1) * 12;
    (0..count)
        .rev()
        .map(|back| months_before(last, back))
        .collect()
}

/// `Auto` refines monthly once a market has history, and explores quarterly
/// on its first pass.
pub fn resolve_cadence(configured: Cadence, has_prior_snapshots: bool) -> Cadence {
    match configured {
        Cadence::Auto if has_prior_snapshots => Cadence::Monthly,
        Cadence::Auto => Cadence::Quarterly,
        fixed => fixed,
    }
}

/// Whether the anchor at `index` is computed directly. The first anchor
/// always is, so every carry-forward has a source.
pub fn is_direct(anchor: NaiveDate, index: usize, cadence: Cadence) -> bool {
    match cadence {
        Cadence::Quarterly => index == 0 || anchor.month0() % 3 == 0,
        Cadence::Monthly | Cadence::Auto => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn anchors_cover_the_lookback_month_by_month() {
        let anchors = monthly_anchors(date(2024, 3, 17), 2).unwrap();
        assert_eq!(anchors.len(), 24);
        assert_eq!(anchors.first(), Some(&date(2022, 4, 1)));
        assert_eq!(anchors.last(), Some(&date(2024, 3, 1)));
        for pair in anchors.windows(2) {
            assert_eq!(months_before(pair[1], 1).unwrap(), pair[0]);
        }
    }

    #[test]
    fn auto_cadence_depends_on_history() {
        assert_eq!(resolve_cadence(Cadence::Auto, false), Cadence::Quarterly);
        assert_eq!(resolve_cadence(Cadence::Auto, true), Cadence::Monthly);
        assert_eq!(resolve_cadence(Cadence::Quarterly, true), Cadence::Quarterly);
    }

    #[test]
    fn quarterly_computes_quarter_starts_and_the_first_anchor() {
        assert!(is_direct(date(2022, 2, 1), 0, Cadence::Quarterly));
        assert!(!is_direct(date(2022, 2, 1), 1, Cadence::Quarterly));
        assert!(is_direct(date(2022, 4, 1), 2, Cadence::Quarterly));
        assert!(is_direct(date(2022, 10, 1), 8, Cadence::Quarterly));
        assert!(is_direct(date(2022, 5, 1), 3, Cadence::Monthly));
    }
}
