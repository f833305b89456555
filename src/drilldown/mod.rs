use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::config::Policy;
use crate::date_util::round_to;
use crate::error::{Error, Result};
use crate::metrics::{FoldRule, KpiKey, MetricRule};
use crate::response::Timeframe;
use crate::series::{SeriesSnapshot, Source};
use crate::window::fold::{buckets, fold, fold_metric, Bucket};
use crate::window::{Month, Period, WindowPair};

/// Maximum number of breakdown rows returned.
pub const BREAKDOWN_LIMIT: usize = 20;

/// Breakdown label for orders with no customer attribute.
const UNKNOWN: &str = "Unknown";

/// Metrics that can be drilled into: the executive KPIs plus supply metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrilldownKey {
    Kpi(KpiKey),
    LeadTime,
    InventoryTurns,
    CogsVariance,
}

impl DrilldownKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrilldownKey::Kpi(k) => k.as_str(),
            DrilldownKey::LeadTime => "lead_time",
            DrilldownKey::InventoryTurns => "inventory_turns",
            DrilldownKey::CogsVariance => "cogs_variance",
        }
    }

    pub fn is_supply(&self) -> bool {
        !matches!(self, DrilldownKey::Kpi(_))
    }

    pub fn rule(&self, policy: &Policy) -> MetricRule {
        match self {
            DrilldownKey::Kpi(k) => k.rule(policy),
            DrilldownKey::LeadTime => MetricRule::AverageOverWindow(Source::LeadTimeDays),
            DrilldownKey::InventoryTurns => MetricRule::AverageOverWindow(Source::InventoryTurns),
            DrilldownKey::CogsVariance => MetricRule::AverageOverWindow(Source::CogsVariancePct),
        }
    }

    pub fn unit(&self, policy: &Policy) -> Option<String> {
        match self {
            DrilldownKey::Kpi(k) => k.unit(policy),
            DrilldownKey::LeadTime => Some("days".to_string()),
            DrilldownKey::InventoryTurns => Some("turns".to_string()),
            DrilldownKey::CogsVariance => Some("%".to_string()),
        }
    }

    fn precision(&self) -> u32 {
        match self {
            DrilldownKey::Kpi(k) => k.precision(),
            _ => 2,
        }
    }

    /// Name of the value column in each series row.
    fn field(&self) -> &'static str {
        match self {
            DrilldownKey::Kpi(KpiKey::Backlog) => "backlog",
            DrilldownKey::Kpi(KpiKey::Gm) => "gm",
            DrilldownKey::Kpi(KpiKey::Uptime) => "uptime",
            DrilldownKey::Kpi(KpiKey::Nrr) => "nrr",
            DrilldownKey::Kpi(_) => "value",
            DrilldownKey::LeadTime => "lead_time_days",
            DrilldownKey::InventoryTurns => "turns_per_year",
            DrilldownKey::CogsVariance => "variance_pct",
        }
    }

    /// Dimension used when the caller does not name one.
    pub fn default_dimension(&self) -> Dimension {
        if self.is_supply() {
            Dimension::Component
        } else {
            Dimension::Customer
        }
    }

    fn supports(&self, dimension: Dimension) -> bool {
        match dimension {
            Dimension::Component => self.is_supply(),
            _ => !self.is_supply(),
        }
    }

    /// Parse a dimension name for this metric. Unknown names and dimensions
    /// the metric cannot be broken down by are both rejected.
    pub fn parse_dimension(&self, s: &str) -> Result<Dimension> {
        let name = s.trim().to_lowercase();
        let dimension = match name.as_str() {
            "customer" => Dimension::Customer,
            "industry" => Dimension::Industry,
            "source" => Dimension::Source,
            "component" => Dimension::Component,
            _ => return Err(self.invalid_dimension(&name)),
        };
        if !self.supports(dimension) {
            return Err(self.invalid_dimension(dimension.as_str()));
        }
        Ok(dimension)
    }

    fn invalid_dimension(&self, dimension: &str) -> Error {
        Error::InvalidDimension {
            metric: self.to_string(),
            dimension: dimension.to_string(),
        }
    }
}

impl FromStr for DrilldownKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "lead_time" => Ok(DrilldownKey::LeadTime),
            "inventory_turns" => Ok(DrilldownKey::InventoryTurns),
            "cogs_variance" => Ok(DrilldownKey::CogsVariance),
            other => other.parse::<KpiKey>().map(DrilldownKey::Kpi),
        }
    }
}

impl std::fmt::Display for DrilldownKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DrilldownKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Attribute the breakdown groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Customer,
    Industry,
    Source,
    Component,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Customer => "customer",
            Dimension::Industry => "industry",
            Dimension::Source => "source",
            Dimension::Component => "component",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesRow {
    pub period: Period,
    #[serde(flatten)]
    pub values: BTreeMap<&'static str, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownRow {
    pub name: String,
    pub value: f64,
    pub count: usize,
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Drilldown {
    pub timeframe: Timeframe,
    pub metric: DrilldownKey,
    pub unit: Option<String>,
    pub series: Vec<SeriesRow>,
    pub breakdown: Vec<BreakdownRow>,
}

/// Build the drill-down for `key` over the current window of `windows`: a
/// bucketed series plus a ranked breakdown by dimension.
///
/// Each bucket re-applies the metric's own rule to the bucket's months, so a
/// quarter row never averages three monthly ratios.
pub fn compute_drilldown(
    key: DrilldownKey,
    windows: &WindowPair,
    dimension: Option<Dimension>,
    data: &SeriesSnapshot,
    policy: &Policy,
) -> Result<Drilldown> {
    let dimension = dimension.unwrap_or_else(|| key.default_dimension());
    if !key.supports(dimension) {
        return Err(key.invalid_dimension(dimension.as_str()));
    }

    let window = &windows.current;
    let bucket_list = buckets(window);
    let series = match key {
        DrilldownKey::Kpi(KpiKey::Revenue) => revenue_series(&bucket_list, data),
        DrilldownKey::Kpi(KpiKey::Nrr) if data.nrr.observed_in(window.periods()).count() < 2 => {
            log::debug!("Fewer than two NRR observations in window, using month-over-month revenue");
            nrr_from_revenue(&bucket_list, data)
        }
        _ => rule_series(key, &bucket_list, data, policy),
    };

    let breakdown = match dimension {
        Dimension::Component => rank(
            data.cogs_breakdown
                .iter()
                .map(|c| (c.component.clone(), c.cost)),
        ),
        attr => rank(
            data.orders_between(window.start_date(), window.end_date())
                .map(|o| {
                    let customer = o.customer.as_ref();
                    let name = match attr {
                        Dimension::Industry => customer.and_then(|c| c.industry.clone()),
                        Dimension::Source => customer.and_then(|c| c.source.clone()),
                        _ => customer.and_then(|c| c.name.clone()),
                    };
                    (name.unwrap_or_else(|| UNKNOWN.to_string()), o.amount)
                }),
        ),
    };

    log::info!(
        "Drilldown {key} by {dimension}: {} series rows, {} breakdown rows",
        series.len(),
        breakdown.len()
    );

    Ok(Drilldown {
        timeframe: Timeframe::of(windows.range, window),
        metric: key,
        unit: key.unit(policy),
        series,
        breakdown,
    })
}

fn revenue_series(bucket_list: &[Bucket], data: &SeriesSnapshot) -> Vec<SeriesRow> {
    bucket_list
        .iter()
        .filter(|b| data.recognized.has_any(&b.months))
        .map(|b| {
            let recognized = fold(&data.recognized, b, FoldRule::Sum).unwrap_or(0.0);
            let booked = fold(&data.booked, b, FoldRule::Sum).unwrap_or(0.0);
            let backlog = fold(&data.backlog, b, FoldRule::Last).unwrap_or(0.0);
            SeriesRow {
                period: b.period,
                values: BTreeMap::from([
                    ("recognized", round_to(recognized, 2)),
                    ("booked", round_to(booked, 2)),
                    ("backlog", round_to(backlog, 2)),
                ]),
            }
        })
        .collect()
}

/// One row per bucket with an observation of the rule's inputs. Rules with no
/// inputs (constants) produce a row for every bucket.
fn rule_series(
    key: DrilldownKey,
    bucket_list: &[Bucket],
    data: &SeriesSnapshot,
    policy: &Policy,
) -> Vec<SeriesRow> {
    let rule = key.rule(policy);
    let sources = rule.sources();
    bucket_list
        .iter()
        .filter(|b| {
            sources.is_empty() || sources.iter().any(|s| data.series(*s).has_any(&b.months))
        })
        .filter_map(|b| {
            let value = fold_metric(&rule, b, data)?;
            Some(SeriesRow {
                period: b.period,
                values: BTreeMap::from([(key.field(), round_to(value, key.precision()))]),
            })
        })
        .collect()
}

/// Month-over-month recognized revenue ratio, averaged per bucket. A month whose
/// predecessor has no positive revenue counts as 1.0.
fn nrr_from_revenue(bucket_list: &[Bucket], data: &SeriesSnapshot) -> Vec<SeriesRow> {
    let mom = |m: Month| {
        let prev = data.recognized.get(m.previous()).unwrap_or(0.0);
        if prev > 0.0 {
            data.recognized.get(m).unwrap_or(0.0) / prev
        } else {
            1.0
        }
    };
    bucket_list
        .iter()
        .map(|b| {
            let total: f64 = b.months.iter().map(|m| mom(*m)).sum();
            let avg = total / b.months.len() as f64;
            SeriesRow {
                period: b.period,
                values: BTreeMap::from([("nrr", round_to(avg, 4))]),
            }
        })
        .collect()
}

/// Group by name, rank by value descending, keep the top rows, and attach each
/// row's share of the kept total.
fn rank(items: impl Iterator<Item = (String, f64)>) -> Vec<BreakdownRow> {
    let mut groups: HashMap<String, (f64, usize)> = HashMap::new();
    for (name, value) in items {
        let entry = groups.entry(name).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    let mut rows: Vec<(String, f64, usize)> =
        groups.into_iter().map(|(name, (value, count))| (name, value, count)).collect();
    rows.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    rows.truncate(BREAKDOWN_LIMIT);

    let total: f64 = rows.iter().map(|r| r.1).sum();
    let total = if total == 0.0 { 1.0 } else { total };
    rows.into_iter()
        .map(|(name, value, count)| BreakdownRow {
            share: value / total,
            name,
            value,
            count,
        })
        .collect()
}
