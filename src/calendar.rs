//! calendar.rs
//! Sampling-frequency detection and calendar stepping for the roll-forward loop.
//!
//! Month, quarter and year steps are taken from the anchor date rather than
//! chained, so `Jan 31 + 1M = Feb 28` but `Jan 31 + 2M = Mar 31`.

use crate::error::{ForecastError, Result};
use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    /// Classifies a sequence of timestamps by its modal gap in days.
    ///
    /// Ties between gaps resolve to the smallest gap.
    pub fn detect(timestamps: &[NaiveDate]) -> Result<Self> {
        if timestamps.len() < 2 {
            return Err(ForecastError::InsufficientData(
                "at least two timestamps are needed to detect a frequency".into(),
            ));
        }
        let mut sorted = timestamps.to_vec();
        sorted.sort_unstable();

        let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
        for pair in sorted.windows(2) {
            *counts.entry((pair[1] - pair[0]).num_days()).or_insert(0) += 1;
        }

        // BTreeMap iterates ascending, so `max_by_key` keeps the last maximum;
        // walk in reverse to keep the smallest gap on ties.
        let modal_gap = counts
            .iter()
            .rev()
            .max_by_key(|(_, &count)| count)
            .map(|(&gap, _)| gap)
            .unwrap_or(0);

        Ok(Self::from_gap_days(modal_gap))
    }

    pub fn from_gap_days(days: i64) -> Self {
        match days {
            1 => Frequency::Daily,
            7 => Frequency::Weekly,
            29..=31 => Frequency::Monthly,
            87..=93 => Frequency::Quarterly,
            _ => Frequency::Yearly,
        }
    }

    pub fn periods_per_year(&self) -> f64 {
        match self {
            Frequency::Daily => 365.0,
            Frequency::Weekly => 52.0,
            Frequency::Monthly => 12.0,
            Frequency::Quarterly => 4.0,
            Frequency::Yearly => 1.0,
        }
    }

    /// Moves `date` by `periods` steps of this frequency (negative = backwards).
    /// Returns `None` when the result falls outside chrono's supported range.
    pub fn shift(&self, date: NaiveDate, periods: i64) -> Option<NaiveDate> {
        let magnitude = periods.unsigned_abs();
        let forward = periods >= 0;
        match self {
            Frequency::Daily => step_days(date, magnitude, forward),
            Frequency::Weekly => step_days(date, magnitude.checked_mul(7)?, forward),
            Frequency::Monthly => step_months(date, magnitude, forward),
            Frequency::Quarterly => step_months(date, magnitude.checked_mul(3)?, forward),
            Frequency::Yearly => step_months(date, magnitude.checked_mul(12)?, forward),
        }
    }
}

fn step_days(date: NaiveDate, days: u64, forward: bool) -> Option<NaiveDate> {
    if forward {
        date.checked_add_days(Days::new(days))
    } else {
        date.checked_sub_days(Days::new(days))
    }
}

fn step_months(date: NaiveDate, months: u64, forward: bool) -> Option<NaiveDate> {
    let months = Months::new(u32::try_from(months).ok()?);
    if forward {
        date.checked_add_months(months)
    } else {
        date.checked_sub_months(months)
    }
}

/// All dates from `start` to `end` (both inclusive) stepping by `freq`.
pub fn date_range(start: NaiveDate, end: NaiveDate, freq: Frequency) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut k = 0;
    while let Some(current) = freq.shift(start, k) {
        if current > end {
            break;
        }
        dates.push(current);
        k += 1;
    }
    dates
}

/// The `n` dates strictly before `date`, oldest first.
pub fn previous_dates(date: NaiveDate, freq: Frequency, n: usize) -> Vec<NaiveDate> {
    (1..=n as i64)
        .rev()
        .filter_map(|k| freq.shift(date, -k))
        .collect()
}

/// Converts an annual growth percentage into a per-period fraction.
pub fn annual_rate_to_period_rate(annual_percent: f64, freq: Frequency) -> f64 {
    annual_percent / (100.0 * freq.periods_per_year())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_detect_daily() {
        let dates: Vec<_> = (0..100).map(|i| d(2023, 1, 1) + Days::new(i)).collect();
        assert_eq!(Frequency::detect(&dates).unwrap(), Frequency::Daily);
    }

    #[test]
    fn test_detect_monthly_first_of_month() {
        let dates = date_range(d(2019, 1, 1), d(2022, 12, 1), Frequency::Monthly);
        assert_eq!(Frequency::detect(&dates).unwrap(), Frequency::Monthly);
    }

    #[test]
    fn test_detect_unsorted_input() {
        let dates = vec![d(2023, 1, 15), d(2023, 1, 1), d(2023, 1, 8), d(2023, 1, 22)];
        assert_eq!(Frequency::detect(&dates).unwrap(), Frequency::Weekly);
    }

    #[test]
    fn test_detect_requires_two_points() {
        assert!(Frequency::detect(&[d(2023, 1, 1)]).is_err());
    }

    #[rstest]
    #[case(1, Frequency::Daily)]
    #[case(7, Frequency::Weekly)]
    #[case(28, Frequency::Yearly)]
    #[case(29, Frequency::Monthly)]
    #[case(31, Frequency::Monthly)]
    #[case(87, Frequency::Quarterly)]
    #[case(93, Frequency::Quarterly)]
    #[case(365, Frequency::Yearly)]
    fn test_gap_classification(#[case] gap: i64, #[case] expected: Frequency) {
        assert_eq!(Frequency::from_gap_days(gap), expected);
    }

    #[test]
    fn test_monthly_date_range_inclusive() {
        let dates = date_range(d(2023, 1, 1), d(2023, 4, 1), Frequency::Monthly);
        assert_eq!(dates, vec![d(2023, 1, 1), d(2023, 2, 1), d(2023, 3, 1), d(2023, 4, 1)]);
    }

    #[test]
    fn test_quarterly_range_crosses_year() {
        let dates = date_range(d(2022, 10, 1), d(2023, 7, 1), Frequency::Quarterly);
        assert_eq!(dates, vec![d(2022, 10, 1), d(2023, 1, 1), d(2023, 4, 1), d(2023, 7, 1)]);
    }

    #[test]
    fn test_month_end_anchor_is_preserved() {
        let dates = date_range(d(2023, 1, 31), d(2023, 3, 31), Frequency::Monthly);
        assert_eq!(dates, vec![d(2023, 1, 31), d(2023, 2, 28), d(2023, 3, 31)]);
    }

    #[test]
    fn test_empty_range_when_start_after_end() {
        assert!(date_range(d(2023, 5, 1), d(2023, 4, 1), Frequency::Daily).is_empty());
    }

    #[test]
    fn test_previous_dates_oldest_first() {
        let dates = previous_dates(d(2023, 2, 1), Frequency::Monthly, 3);
        assert_eq!(dates, vec![d(2022, 11, 1), d(2022, 12, 1), d(2023, 1, 1)]);
    }

    #[test]
    fn test_previous_quarters_from_april() {
        let dates = previous_dates(d(2023, 4, 1), Frequency::Quarterly, 2);
        assert_eq!(dates, vec![d(2022, 10, 1), d(2023, 1, 1)]);
    }

    #[rstest]
    #[case(Frequency::Monthly, 12.0, 0.01)]
    #[case(Frequency::Quarterly, 8.0, 0.02)]
    #[case(Frequency::Yearly, 5.0, 0.05)]
    fn test_annual_rate_conversion(#[case] freq: Frequency, #[case] annual: f64, #[case] expected: f64) {
        assert!((annual_rate_to_period_rate(annual, freq) - expected).abs() < 1e-12);
    }
}
