pub mod fold;
pub mod period;

use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{Error, Result};
pub use period::{Month, Period};

/// Requested look-back length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Range {
    #[serde(rename = "6m")]
    SixMonths,
    #[serde(rename = "12m")]
    TwelveMonths,
}

impl Range {
    /// Number of calendar months covered by the window.
    pub fn months(&self) -> u32 {
        match self {
            Range::SixMonths => 6,
            Range::TwelveMonths => 12,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Range::SixMonths => "6m",
            Range::TwelveMonths => "12m",
        }
    }
}

impl FromStr for Range {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "6m" => Ok(Range::SixMonths),
            "12m" => Ok(Range::TwelveMonths),
            other => Err(Error::InvalidRange(other.to_string())),
        }
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output bucket size presented to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Month,
    Quarter,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Month => "month",
            Granularity::Quarter => "quarter",
        }
    }

    /// The output label for `month` at this granularity.
    pub fn label(&self, month: Month) -> Period {
        match self {
            Granularity::Month => Period::Month(month),
            Granularity::Quarter => Period::quarter_of(month),
        }
    }
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "month" => Ok(Granularity::Month),
            "quarter" => Ok(Granularity::Quarter),
            other => Err(Error::InvalidGranularity(other.to_string())),
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contiguous, ascending, non-empty run of months.
///
/// Windows always hold months; quarter output is a fold applied to the
/// aggregated series afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    periods: Vec<Month>,
    granularity: Granularity,
}

impl TimeWindow {
    /// Window of `count` months ending at `end`. `count` of zero is widened to one.
    pub fn ending_at(end: Month, count: u32, granularity: Granularity) -> Self {
        Self {
            periods: end.trailing(count.max(1)),
            granularity,
        }
    }

    /// Window covering `start..=end`. Returns `None` when `start > end`.
    pub fn spanning(start: Month, end: Month, granularity: Granularity) -> Option<Self> {
        if start > end {
            return None;
        }
        let mut periods = vec![start];
        let mut cur = start;
        while cur < end {
            cur = cur.next();
            periods.push(cur);
        }
        Some(Self {
            periods,
            granularity,
        })
    }

    pub fn start(&self) -> Month {
        self.periods[0]
    }

    pub fn end(&self) -> Month {
        self.periods[self.periods.len() - 1]
    }

    pub fn periods(&self) -> &[Month] {
        &self.periods
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// First day of the first month (inclusive).
    pub fn start_date(&self) -> NaiveDate {
        self.start().first_day()
    }

    /// Last day of the last month (inclusive).
    pub fn end_date(&self) -> NaiveDate {
        self.end().last_day()
    }

    /// The window of identical length immediately before this one.
    pub fn preceding(&self) -> Self {
        Self::ending_at(
            self.start().previous(),
            self.periods.len() as u32,
            self.granularity,
        )
    }
}

/// The current window plus its equal-length predecessor used for deltas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPair {
    pub range: Range,
    pub current: TimeWindow,
    pub prior: TimeWindow,
}

/// Resolve `(range, granularity)` against an explicit reference date.
///
/// The current window ends at the last day of `today`'s month and starts at the
/// first day of the month `N - 1` months earlier. The prior window is the `N`
/// months immediately before it.
pub fn resolve(range: Range, granularity: Granularity, today: NaiveDate) -> WindowPair {
    let current = TimeWindow::ending_at(Month::of(today), range.months(), granularity);
    let prior = current.preceding();
    log::debug!(
        "Resolved {range}/{granularity} at {today}: {}..{} (prior {}..{})",
        current.start(),
        current.end(),
        prior.start(),
        prior.end()
    );
    WindowPair {
        range,
        current,
        prior,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn month(y: i32, m: u32) -> Month {
        Month::new(y, m).unwrap()
    }

    #[test]
    fn test_parse_range_and_granularity() {
        assert_eq!("6m".parse::<Range>().unwrap(), Range::SixMonths);
        assert_eq!("12M".parse::<Range>().unwrap(), Range::TwelveMonths);
        assert_eq!("quarter".parse::<Granularity>().unwrap(), Granularity::Quarter);
        assert!(matches!("3m".parse::<Range>(), Err(Error::InvalidRange(_))));
        assert!(matches!(
            "week".parse::<Granularity>(),
            Err(Error::InvalidGranularity(_))
        ));
        assert!(matches!("".parse::<Range>(), Err(Error::InvalidRange(_))));
    }

    #[test]
    fn test_resolve_twelve_months() {
        // 12m on Aug 2025: 2024-09-01 ~ 2025-08-31
        let pair = resolve(Range::TwelveMonths, Granularity::Month, date(2025, 8, 14));
        assert_eq!(pair.current.start_date(), date(2024, 9, 1));
        assert_eq!(pair.current.end_date(), date(2025, 8, 31));
        assert_eq!(pair.current.len(), 12);
        assert_eq!(pair.prior.start(), month(2023, 9));
        assert_eq!(pair.prior.end(), month(2024, 8));
    }

    #[test]
    fn test_resolve_six_months_across_year() {
        let pair = resolve(Range::SixMonths, Granularity::Quarter, date(2026, 2, 28));
        assert_eq!(pair.current.start(), month(2025, 9));
        assert_eq!(pair.current.end(), month(2026, 2));
        assert_eq!(pair.current.end_date(), date(2026, 2, 28));
        assert_eq!(pair.prior.start(), month(2025, 3));
        assert_eq!(pair.prior.end(), month(2025, 8));
        assert_eq!(pair.current.granularity(), Granularity::Quarter);
    }

    #[test]
    fn test_windows_are_contiguous_and_adjacent() {
        let days = [date(2024, 1, 1), date(2024, 2, 29), date(2025, 12, 31), date(2026, 7, 4)];
        for today in days {
            for range in [Range::SixMonths, Range::TwelveMonths] {
                for granularity in [Granularity::Month, Granularity::Quarter] {
                    let pair = resolve(range, granularity, today);
                    for w in [&pair.current, &pair.prior] {
                        assert_eq!(w.len(), range.months() as usize);
                        for step in w.periods().windows(2) {
                            assert_eq!(step[0].next(), step[1]);
                        }
                        assert_eq!(*w.periods().last().unwrap(), w.end());
                    }
                    assert_eq!(pair.prior.end().next(), pair.current.start());
                    assert_eq!(pair.current.end(), Month::of(today));
                }
            }
        }
    }

    #[test]
    fn test_spanning() {
        let w = TimeWindow::spanning(month(2025, 11), month(2026, 2), Granularity::Month).unwrap();
        assert_eq!(
            w.periods(),
            &[month(2025, 11), month(2025, 12), month(2026, 1), month(2026, 2)]
        );
        assert!(TimeWindow::spanning(month(2026, 3), month(2026, 2), Granularity::Month).is_none());
    }
}
