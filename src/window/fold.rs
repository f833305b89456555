use crate::metrics::{FoldRule, MetricRule};
use crate::series::{MonthlySeries, SeriesSnapshot};

use super::{Granularity, Month, Period, TimeWindow};

/// One output bucket and the window months it covers.
///
/// Aggregation always happens over months; a bucket only decides how its
/// months collapse into a single value for presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub period: Period,
    pub months: Vec<Month>,
}

impl Bucket {
    /// The bucket's own months as a window, for rules that are recomputed.
    pub fn window(&self) -> TimeWindow {
        let granularity = match self.period {
            Period::Month(_) => Granularity::Month,
            Period::Quarter(..) => Granularity::Quarter,
        };
        // Buckets are built from a contiguous window, so they are never empty.
        TimeWindow::spanning(self.months[0], self.months[self.months.len() - 1], granularity)
            .unwrap_or_else(|| TimeWindow::ending_at(self.months[0], 1, granularity))
    }
}

/// Split `window` into ascending buckets at its granularity.
///
/// Quarter buckets at either edge of the window may hold fewer than three
/// months; they keep whatever months the window covers.
pub fn buckets(window: &TimeWindow) -> Vec<Bucket> {
    let granularity = window.granularity();
    let mut out: Vec<Bucket> = Vec::new();
    for month in window.periods() {
        let period = granularity.label(*month);
        match out.last_mut() {
            Some(bucket) if bucket.period == period => bucket.months.push(*month),
            _ => out.push(Bucket {
                period,
                months: vec![*month],
            }),
        }
    }
    out
}

/// Fold a raw series over one bucket. `None` when the bucket has no observation.
///
/// [`FoldRule::Recompute`] has no meaning for a bare series and is treated as
/// an average of the observed months.
pub fn fold(series: &MonthlySeries, bucket: &Bucket, rule: FoldRule) -> Option<f64> {
    match rule {
        FoldRule::Sum => series
            .has_any(&bucket.months)
            .then(|| series.sum_over(&bucket.months)),
        FoldRule::Last => series.last_in(&bucket.months),
        FoldRule::Recompute => series.mean_over(&bucket.months),
    }
}

/// Value of a KPI rule for one bucket, following the rule's fold class.
///
/// Flow and stock rules fold their single source series. Every other rule is
/// evaluated again over the bucket's own months.
pub fn fold_metric(rule: &MetricRule, bucket: &Bucket, data: &SeriesSnapshot) -> Option<f64> {
    match (rule.fold_rule(), rule) {
        (FoldRule::Sum, MetricRule::SumOverWindow(source))
        | (FoldRule::Last, MetricRule::PeriodEndSnapshot(source)) => {
            fold(data.series(*source), bucket, rule.fold_rule())
        }
        _ => rule.evaluate(&bucket.window(), data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Source;

    fn m(y: i32, mo: u32) -> Month {
        Month::new(y, mo).unwrap()
    }

    fn window(end: Month, n: u32, granularity: Granularity) -> TimeWindow {
        TimeWindow::ending_at(end, n, granularity)
    }

    #[test]
    fn test_month_buckets_one_per_month() {
        let b = buckets(&window(m(2025, 6), 6, Granularity::Month));
        assert_eq!(b.len(), 6);
        assert_eq!(b[0].period, Period::Month(m(2025, 1)));
        assert!(b.iter().all(|bucket| bucket.months.len() == 1));
    }

    #[test]
    fn test_quarter_buckets_aligned() {
        let b = buckets(&window(m(2025, 6), 6, Granularity::Quarter));
        assert_eq!(b.len(), 2);
        assert_eq!(b[0].period, Period::Quarter(2025, 1));
        assert_eq!(b[0].months, vec![m(2025, 1), m(2025, 2), m(2025, 3)]);
        assert_eq!(b[1].period, Period::Quarter(2025, 2));
    }

    #[test]
    fn test_partial_quarters_at_edges() {
        // Sep 2025 .. Feb 2026: Q3 (Sep), Q4 (Oct-Dec), Q1 (Jan-Feb)
        let b = buckets(&window(m(2026, 2), 6, Granularity::Quarter));
        let shape: Vec<(String, usize)> = b.iter().map(|x| (x.period.to_key(), x.months.len())).collect();
        assert_eq!(
            shape,
            vec![
                ("2025-Q3".to_string(), 1),
                ("2025-Q4".to_string(), 3),
                ("2026-Q1".to_string(), 2)
            ]
        );
    }

    #[test]
    fn test_quarter_backlog_takes_last_month() {
        let series: MonthlySeries = [(m(2025, 1), 1000.0), (m(2025, 2), 1200.0), (m(2025, 3), 900.0)]
            .into_iter()
            .collect();
        let b = buckets(&window(m(2025, 3), 3, Granularity::Quarter));
        assert_eq!(fold(&series, &b[0], FoldRule::Last), Some(900.0));
        assert_eq!(fold(&series, &b[0], FoldRule::Sum), Some(3100.0));
    }

    #[test]
    fn test_sum_of_empty_bucket_is_absent() {
        let series: MonthlySeries = [(m(2025, 1), 10.0)].into_iter().collect();
        let b = buckets(&window(m(2025, 6), 6, Granularity::Quarter));
        assert_eq!(fold(&series, &b[0], FoldRule::Sum), Some(10.0));
        assert_eq!(fold(&series, &b[1], FoldRule::Sum), None);
    }

    #[test]
    fn test_fold_metric_quarter_revenue() {
        let mut snap = SeriesSnapshot::new();
        for mo in 1..=6 {
            snap.insert_revenue(m(2025, mo), 100.0, 100.0, 0.0);
        }
        let rule = MetricRule::SumOverWindow(Source::Recognized);
        let values: Vec<Option<f64>> = buckets(&window(m(2025, 6), 6, Granularity::Quarter))
            .iter()
            .map(|b| fold_metric(&rule, b, &snap))
            .collect();
        assert_eq!(values, vec![Some(300.0), Some(300.0)]);
    }

    #[test]
    fn test_ratio_recomputed_not_averaged() {
        let mut snap = SeriesSnapshot::new();
        // Monthly book-to-bill: 2.0, 1.0, 0.5 -> naive average 1.1667
        snap.insert_revenue(m(2025, 1), 10.0, 20.0, 0.0);
        snap.insert_revenue(m(2025, 2), 100.0, 100.0, 0.0);
        snap.insert_revenue(m(2025, 3), 200.0, 100.0, 0.0);
        let rule = MetricRule::RatioOfSums {
            numerator: Source::Booked,
            denominator: Source::Recognized,
            fallback: 1.0,
        };
        let b = buckets(&window(m(2025, 3), 3, Granularity::Quarter));
        assert_eq!(fold_metric(&rule, &b[0], &snap), Some(220.0 / 310.0));
    }

    #[test]
    fn test_bucket_window() {
        let b = buckets(&window(m(2025, 6), 6, Granularity::Quarter));
        let w = b[1].window();
        assert_eq!(w.start(), m(2025, 4));
        assert_eq!(w.end(), m(2025, 6));
        assert_eq!(w.granularity(), Granularity::Quarter);
    }
}
