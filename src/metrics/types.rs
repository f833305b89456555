use std::str::FromStr;

use serde::Serialize;

use crate::config::Policy;
use crate::error::{Error, Result};
use crate::series::Source;

use super::rules::MetricRule;

/// Direction of change against the prior window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Flat,
}

/// The fixed executive KPI set, in presentation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiKey {
    Revenue,
    Backlog,
    Uptime,
    Nrr,
    Gm,
    Payback,
    BookToBill,
    CoverageMonths,
    Arr,
    Forecast,
}

impl KpiKey {
    pub const ALL: [KpiKey; 10] = [
        KpiKey::Revenue,
        KpiKey::Backlog,
        KpiKey::Uptime,
        KpiKey::Nrr,
        KpiKey::Gm,
        KpiKey::Payback,
        KpiKey::BookToBill,
        KpiKey::CoverageMonths,
        KpiKey::Arr,
        KpiKey::Forecast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KpiKey::Revenue => "revenue",
            KpiKey::Backlog => "backlog",
            KpiKey::Uptime => "uptime",
            KpiKey::Nrr => "nrr",
            KpiKey::Gm => "gm",
            KpiKey::Payback => "payback",
            KpiKey::BookToBill => "book_to_bill",
            KpiKey::CoverageMonths => "coverage_months",
            KpiKey::Arr => "arr",
            KpiKey::Forecast => "forecast",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            KpiKey::Revenue => "Recognized Revenue",
            KpiKey::Backlog => "Backlog",
            KpiKey::Uptime => "Uptime",
            KpiKey::Nrr => "NRR",
            KpiKey::Gm => "Gross Margin",
            KpiKey::Payback => "Payback (mo)",
            KpiKey::BookToBill => "Book-to-Bill",
            KpiKey::CoverageMonths => "Coverage Months",
            KpiKey::Arr => "ARR",
            KpiKey::Forecast => "Forecast",
        }
    }

    /// Decimal places the reported value is rounded to.
    pub fn precision(&self) -> u32 {
        match self {
            KpiKey::Uptime | KpiKey::Nrr | KpiKey::Gm => 4,
            KpiKey::CoverageMonths => 1,
            _ => 2,
        }
    }

    /// Only revenue and backlog are compared against the prior window.
    pub fn exposes_delta(&self) -> bool {
        matches!(self, KpiKey::Revenue | KpiKey::Backlog)
    }

    pub fn unit(&self, policy: &Policy) -> Option<String> {
        match self {
            KpiKey::Revenue | KpiKey::Backlog | KpiKey::Arr | KpiKey::Forecast => {
                Some(policy.currency_unit.clone())
            }
            KpiKey::Payback => Some("mo".to_string()),
            _ => None,
        }
    }

    /// The aggregation rule bound to this KPI.
    pub fn rule(&self, policy: &Policy) -> MetricRule {
        match self {
            KpiKey::Revenue => MetricRule::SumOverWindow(Source::Recognized),
            KpiKey::Backlog => MetricRule::PeriodEndSnapshot(Source::Backlog),
            KpiKey::Uptime => MetricRule::AverageOverWindow(Source::Uptime),
            KpiKey::Nrr => MetricRule::LatestAsOf {
                source: Source::Nrr,
                fallback: policy.nrr_fallback,
            },
            KpiKey::Gm => MetricRule::RatioOfSums {
                numerator: Source::OrderProfit,
                denominator: Source::OrderAmount,
                fallback: 0.0,
            },
            KpiKey::Payback => MetricRule::Constant(policy.payback_months),
            KpiKey::BookToBill => MetricRule::RatioOfSums {
                numerator: Source::Booked,
                denominator: Source::Recognized,
                fallback: policy.book_to_bill_fallback,
            },
            KpiKey::CoverageMonths => MetricRule::FixedLookbackAverage {
                stock: Source::Backlog,
                flow: Source::Recognized,
                months: policy.coverage_lookback_months,
                fallback: 0.0,
            },
            KpiKey::Arr => MetricRule::DerivedFormula {
                source: Source::RecurringAmount,
                multiplier: 12.0,
            },
            KpiKey::Forecast => MetricRule::FallbackChain(vec![
                MetricRule::PipelineConversion {
                    pipeline: Source::PipelineCount,
                    win_rate_pct: Source::WinRatePct,
                },
                MetricRule::TrailingAverage {
                    source: Source::Recognized,
                    months: policy.forecast_lookback_months,
                    multiplier: policy.forecast_uplift,
                },
            ]),
        }
    }
}

impl FromStr for KpiKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        KpiKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or(Error::InvalidMetric(s))
    }
}

impl std::fmt::Display for KpiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One aggregated executive KPI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedKpi {
    pub key: KpiKey,
    pub label: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Fractional change vs. the prior window; serialized as `null` when absent.
    pub delta: Option<f64>,
    pub direction: Direction,
}
