use crate::series::{SeriesSnapshot, Source};
use crate::window::{Month, TimeWindow};

/// How a metric rolls monthly observations into a wider bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldRule {
    /// Flow metrics: add the constituent months.
    Sum,
    /// Stock metrics: take the last constituent month.
    Last,
    /// Ratio and derived metrics: re-run the rule on the bucket's own months.
    Recompute,
}

/// The closed set of aggregation rules. Every KPI is bound to exactly one.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricRule {
    /// Σ of the source across the window's months.
    SumOverWindow(Source),
    /// Last observed value inside the window.
    PeriodEndSnapshot(Source),
    /// Mean of the observed monthly values inside the window.
    AverageOverWindow(Source),
    /// Most recent observation at or before the window end, however old.
    LatestAsOf { source: Source, fallback: f64 },
    /// Σ numerator / Σ denominator over the window.
    RatioOfSums {
        numerator: Source,
        denominator: Source,
        fallback: f64,
    },
    /// Ending stock ÷ mean flow of the `months` trailing months ending at the
    /// window end. The lookback never follows the requested range.
    FixedLookbackAverage {
        stock: Source,
        flow: Source,
        months: u32,
        fallback: f64,
    },
    /// `multiplier ×` the source's total in the window's final month.
    DerivedFormula { source: Source, multiplier: f64 },
    /// A configured value with no series input.
    Constant(f64),
    /// Latest monthly pipeline count × latest win rate (a percentage).
    /// Unavailable when either input is missing or the product is not positive.
    PipelineConversion { pipeline: Source, win_rate_pct: Source },
    /// Mean of the observed months in the trailing lookback, scaled.
    TrailingAverage {
        source: Source,
        months: u32,
        multiplier: f64,
    },
    /// Try each rule in order; the first with sufficient input wins.
    FallbackChain(Vec<MetricRule>),
}

impl MetricRule {
    /// Evaluate over `window`. `None` means the rule had no usable input.
    pub fn evaluate(&self, window: &TimeWindow, data: &SeriesSnapshot) -> Option<f64> {
        let months = window.periods();
        let end = window.end();
        match self {
            MetricRule::SumOverWindow(source) => Some(data.series(*source).sum_over(months)),
            MetricRule::PeriodEndSnapshot(source) => data.series(*source).last_in(months),
            MetricRule::AverageOverWindow(source) => data
                .series(*source)
                .mean_over(months)
                .map(|v| normalize(*source, v)),
            MetricRule::LatestAsOf { source, fallback } => Some(
                data.series(*source)
                    .latest_as_of(end)
                    .map(|(_, v)| normalize(*source, v))
                    .unwrap_or(*fallback),
            ),
            MetricRule::RatioOfSums {
                numerator,
                denominator,
                fallback,
            } => {
                let den = data.series(*denominator).sum_over(months);
                if den == 0.0 {
                    return Some(*fallback);
                }
                Some(data.series(*numerator).sum_over(months) / den)
            }
            MetricRule::FixedLookbackAverage {
                stock,
                flow,
                months: lookback,
                fallback,
            } => {
                let ending = data.series(*stock).last_in(months).unwrap_or(0.0);
                match trailing_mean(data, *flow, end, *lookback) {
                    Some(avg) if avg > 0.0 => Some(ending / avg),
                    _ => Some(*fallback),
                }
            }
            MetricRule::DerivedFormula { source, multiplier } => {
                Some(data.series(*source).sum_over(&[end]) * multiplier)
            }
            MetricRule::Constant(value) => Some(*value),
            MetricRule::PipelineConversion {
                pipeline,
                win_rate_pct,
            } => {
                let (_, count) = data.series(*pipeline).latest_as_of(end)?;
                let (_, rate) = data.series(*win_rate_pct).latest_as_of(end)?;
                let value = count * rate / 100.0;
                (value > 0.0).then_some(value)
            }
            MetricRule::TrailingAverage {
                source,
                months: lookback,
                multiplier,
            } => Some(trailing_mean(data, *source, end, *lookback).unwrap_or(0.0) * multiplier),
            MetricRule::FallbackChain(rules) => rules.iter().find_map(|rule| {
                let value = rule.evaluate(window, data);
                if value.is_none() {
                    log::debug!("Fallback chain: {rule:?} unavailable, trying next");
                }
                value
            }),
        }
    }

    /// Fold class used when presenting this metric per bucket.
    pub fn fold_rule(&self) -> FoldRule {
        match self {
            MetricRule::SumOverWindow(_) => FoldRule::Sum,
            MetricRule::PeriodEndSnapshot(_) => FoldRule::Last,
            _ => FoldRule::Recompute,
        }
    }

    /// Raw series this rule reads.
    pub fn sources(&self) -> Vec<Source> {
        match self {
            MetricRule::SumOverWindow(s)
            | MetricRule::PeriodEndSnapshot(s)
            | MetricRule::AverageOverWindow(s)
            | MetricRule::LatestAsOf { source: s, .. }
            | MetricRule::DerivedFormula { source: s, .. }
            | MetricRule::TrailingAverage { source: s, .. } => vec![*s],
            MetricRule::RatioOfSums {
                numerator,
                denominator,
                ..
            } => vec![*numerator, *denominator],
            MetricRule::FixedLookbackAverage { stock, flow, .. } => vec![*stock, *flow],
            MetricRule::PipelineConversion {
                pipeline,
                win_rate_pct,
            } => vec![*pipeline, *win_rate_pct],
            MetricRule::Constant(_) => Vec::new(),
            MetricRule::FallbackChain(rules) => {
                let mut out = Vec::new();
                for s in rules.iter().flat_map(|r| r.sources()) {
                    if !out.contains(&s) {
                        out.push(s);
                    }
                }
                out
            }
        }
    }
}

/// Mean of observed months among the `lookback` months ending at `end`.
fn trailing_mean(data: &SeriesSnapshot, source: Source, end: Month, lookback: u32) -> Option<f64> {
    data.series(source).mean_over(&end.trailing(lookback.max(1)))
}

/// Rates stored as 0-100 are converted to 0-1. Values up to 2 are treated as
/// ratios already so NRR above 100% survives.
pub fn as_fraction(v: f64) -> f64 {
    if v <= 2.0 {
        v
    } else {
        v / 100.0
    }
}

fn normalize(source: Source, v: f64) -> f64 {
    if source.is_rate() {
        as_fraction(v)
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::Granularity;

    fn m(y: i32, mo: u32) -> Month {
        Month::new(y, mo).unwrap()
    }

    fn window(end: Month, n: u32) -> TimeWindow {
        TimeWindow::ending_at(end, n, Granularity::Month)
    }

    fn revenue(values: &[(Month, f64, f64, f64)]) -> SeriesSnapshot {
        let mut snap = SeriesSnapshot::new();
        for (month, rec, booked, backlog) in values {
            snap.insert_revenue(*month, *rec, *booked, *backlog);
        }
        snap
    }

    #[test]
    fn test_ratio_of_sums_fallback_on_zero_denominator() {
        let snap = SeriesSnapshot::new();
        let rule = MetricRule::RatioOfSums {
            numerator: Source::Booked,
            denominator: Source::Recognized,
            fallback: 1.0,
        };
        assert_eq!(rule.evaluate(&window(m(2025, 6), 6), &snap), Some(1.0));

        let snap = revenue(&[(m(2025, 5), 100.0, 150.0, 0.0), (m(2025, 6), 100.0, 50.0, 0.0)]);
        assert_eq!(rule.evaluate(&window(m(2025, 6), 6), &snap), Some(1.0));
        let snap = revenue(&[(m(2025, 6), 200.0, 250.0, 0.0)]);
        assert_eq!(rule.evaluate(&window(m(2025, 6), 6), &snap), Some(1.25));
    }

    #[test]
    fn test_latest_as_of_normalizes_percentages() {
        let mut snap = SeriesSnapshot::new();
        snap.nrr.insert(m(2024, 1), 104.0);
        let rule = MetricRule::LatestAsOf {
            source: Source::Nrr,
            fallback: 1.0,
        };
        assert_eq!(rule.evaluate(&window(m(2025, 6), 6), &snap), Some(1.04));

        snap.nrr.insert(m(2025, 3), 1.1);
        assert_eq!(rule.evaluate(&window(m(2025, 6), 6), &snap), Some(1.1));
        // Nothing at or before the cutoff
        assert_eq!(rule.evaluate(&window(m(2023, 6), 6), &snap), Some(1.0));
    }

    #[test]
    fn test_average_over_window_skips_missing_months() {
        let mut snap = SeriesSnapshot::new();
        snap.uptime.insert(m(2025, 4), 99.0);
        snap.uptime.insert(m(2025, 6), 97.0);
        let rule = MetricRule::AverageOverWindow(Source::Uptime);
        let v = rule.evaluate(&window(m(2025, 6), 6), &snap).unwrap();
        assert!((v - 0.98).abs() < 1e-12);
        assert_eq!(rule.evaluate(&window(m(2024, 6), 6), &snap), None);
    }

    #[test]
    fn test_pipeline_conversion_requires_both_inputs() {
        let rule = MetricRule::PipelineConversion {
            pipeline: Source::PipelineCount,
            win_rate_pct: Source::WinRatePct,
        };
        let mut snap = SeriesSnapshot::new();
        snap.pipeline_count.insert(m(2025, 5), 40.0);
        assert_eq!(rule.evaluate(&window(m(2025, 6), 6), &snap), None);

        snap.win_rate_pct.insert(m(2025, 6), 25.0);
        assert_eq!(rule.evaluate(&window(m(2025, 6), 6), &snap), Some(10.0));

        snap.pipeline_count.insert(m(2025, 6), 0.0);
        assert_eq!(rule.evaluate(&window(m(2025, 6), 6), &snap), None);
    }

    #[test]
    fn test_fallback_chain_takes_first_available() {
        let rule = MetricRule::FallbackChain(vec![
            MetricRule::PeriodEndSnapshot(Source::Backlog),
            MetricRule::Constant(7.0),
        ]);
        let snap = SeriesSnapshot::new();
        assert_eq!(rule.evaluate(&window(m(2025, 6), 6), &snap), Some(7.0));
        let snap = revenue(&[(m(2025, 2), 0.0, 0.0, 42.0)]);
        assert_eq!(rule.evaluate(&window(m(2025, 6), 6), &snap), Some(42.0));
    }

    #[test]
    fn test_derived_formula_reads_only_end_month() {
        let mut snap = SeriesSnapshot::new();
        snap.backlog.insert(m(2025, 5), 10.0);
        snap.backlog.insert(m(2025, 6), 3.0);
        let rule = MetricRule::DerivedFormula {
            source: Source::Backlog,
            multiplier: 12.0,
        };
        assert_eq!(rule.evaluate(&window(m(2025, 6), 12), &snap), Some(36.0));
        assert_eq!(rule.evaluate(&window(m(2025, 7), 12), &snap), Some(0.0));
    }

    #[test]
    fn test_fold_rule_classes() {
        assert_eq!(MetricRule::SumOverWindow(Source::Recognized).fold_rule(), FoldRule::Sum);
        assert_eq!(MetricRule::PeriodEndSnapshot(Source::Backlog).fold_rule(), FoldRule::Last);
        assert_eq!(
            MetricRule::AverageOverWindow(Source::Uptime).fold_rule(),
            FoldRule::Recompute
        );
    }

    #[test]
    fn test_sources_deduplicated_in_chain() {
        let rule = MetricRule::FallbackChain(vec![
            MetricRule::SumOverWindow(Source::Recognized),
            MetricRule::TrailingAverage {
                source: Source::Recognized,
                months: 3,
                multiplier: 1.0,
            },
        ]);
        assert_eq!(rule.sources(), vec![Source::Recognized]);
    }
}
