use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::window::Month;

/// One raw monthly series. At most one observation per month.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlySeries {
    points: BTreeMap<Month, f64>,
}

impl MonthlySeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation, replacing any existing value for the month.
    pub fn insert(&mut self, month: Month, value: f64) {
        self.points.insert(month, value);
    }

    /// Add to the month's value (absent counts as zero).
    pub fn accumulate(&mut self, month: Month, value: f64) {
        *self.points.entry(month).or_insert(0.0) += value;
    }

    pub fn get(&self, month: Month) -> Option<f64> {
        self.points.get(&month).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Observations that fall on `months`, in month order.
    pub fn observed_in<'a>(&'a self, months: &'a [Month]) -> impl Iterator<Item = (Month, f64)> + 'a {
        months
            .iter()
            .filter_map(move |m| self.points.get(m).map(|v| (*m, *v)))
    }

    /// True if any of `months` has an observation.
    pub fn has_any(&self, months: &[Month]) -> bool {
        months.iter().any(|m| self.points.contains_key(m))
    }

    /// Sum over `months`; absent months count as zero.
    pub fn sum_over(&self, months: &[Month]) -> f64 {
        self.observed_in(months).map(|(_, v)| v).sum()
    }

    /// Arithmetic mean of the observed months; `None` when nothing is observed.
    pub fn mean_over(&self, months: &[Month]) -> Option<f64> {
        let (sum, count) = self
            .observed_in(months)
            .fold((0.0, 0usize), |(s, c), (_, v)| (s + v, c + 1));
        if count == 0 {
            None
        } else {
            Some(sum / count as f64)
        }
    }

    /// The last observed value among `months`.
    pub fn last_in(&self, months: &[Month]) -> Option<f64> {
        months.iter().rev().find_map(|m| self.get(*m))
    }

    /// Most recent observation with month `<= cutoff`, regardless of how far back.
    pub fn latest_as_of(&self, cutoff: Month) -> Option<(Month, f64)> {
        self.points
            .range(..=cutoff)
            .next_back()
            .map(|(m, v)| (*m, *v))
    }
}

impl FromIterator<(Month, f64)> for MonthlySeries {
    fn from_iter<I: IntoIterator<Item = (Month, f64)>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

/// Customer attributes used by drill-down breakdowns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Customer {
    pub name: Option<String>,
    pub industry: Option<String>,
    pub source: Option<String>,
}

/// A single order line. Gross margin and ARR are computed from these rather
/// than from the pre-aggregated revenue series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub order_date: NaiveDate,
    pub amount: f64,
    pub profit: f64,
    pub kind: Option<String>,
    pub customer: Option<Customer>,
}

impl Order {
    /// Subscription and recurring orders feed ARR.
    pub fn is_recurring(&self) -> bool {
        matches!(self.kind.as_deref(), Some("subscription") | Some("recurring"))
    }

    pub fn month(&self) -> Month {
        Month::of(self.order_date)
    }
}

/// A component line of the static COGS breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostComponent {
    pub component: String,
    pub cost: f64,
}

/// Identifies one raw monthly input series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Recognized,
    Booked,
    Backlog,
    Uptime,
    Nrr,
    PipelineCount,
    WinRatePct,
    OrderAmount,
    OrderProfit,
    RecurringAmount,
    LeadTimeDays,
    InventoryTurns,
    CogsVariancePct,
}

impl Source {
    /// Rates that may be stored either as a 0-1 ratio or a 0-100 percentage.
    pub fn is_rate(&self) -> bool {
        matches!(self, Source::Uptime | Source::Nrr)
    }
}

/// Everything the engine needs for one request.
///
/// A point-in-time read of the store. The engine only reads it; every request
/// builds its own.
#[derive(Debug, Clone, Default)]
pub struct SeriesSnapshot {
    pub recognized: MonthlySeries,
    pub booked: MonthlySeries,
    pub backlog: MonthlySeries,
    pub uptime: MonthlySeries,
    pub nrr: MonthlySeries,
    pub pipeline_count: MonthlySeries,
    pub win_rate_pct: MonthlySeries,
    pub lead_time_days: MonthlySeries,
    pub inventory_turns: MonthlySeries,
    pub cogs_variance_pct: MonthlySeries,
    pub cogs_breakdown: Vec<CostComponent>,
    orders: Vec<Order>,
    order_amount: MonthlySeries,
    order_profit: MonthlySeries,
    recurring_amount: MonthlySeries,
}

impl SeriesSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one revenue row. The three columns are always observed together.
    pub fn insert_revenue(&mut self, month: Month, recognized: f64, booked: f64, backlog: f64) {
        self.recognized.insert(month, recognized);
        self.booked.insert(month, booked);
        self.backlog.insert(month, backlog);
    }

    /// Attach order-level data and derive the per-month order series from it.
    pub fn set_orders(&mut self, orders: Vec<Order>) {
        let mut amount = MonthlySeries::new();
        let mut profit = MonthlySeries::new();
        let mut recurring = MonthlySeries::new();
        for order in &orders {
            let month = order.month();
            amount.accumulate(month, order.amount);
            profit.accumulate(month, order.profit);
            if order.is_recurring() {
                recurring.accumulate(month, order.amount);
            }
        }
        self.orders = orders;
        self.order_amount = amount;
        self.order_profit = profit;
        self.recurring_amount = recurring;
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Orders dated within `[start, end]` inclusive.
    pub fn orders_between(&self, start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = &Order> {
        self.orders
            .iter()
            .filter(move |o| o.order_date >= start && o.order_date <= end)
    }

    pub fn series(&self, source: Source) -> &MonthlySeries {
        match source {
            Source::Recognized => &self.recognized,
            Source::Booked => &self.booked,
            Source::Backlog => &self.backlog,
            Source::Uptime => &self.uptime,
            Source::Nrr => &self.nrr,
            Source::PipelineCount => &self.pipeline_count,
            Source::WinRatePct => &self.win_rate_pct,
            Source::OrderAmount => &self.order_amount,
            Source::OrderProfit => &self.order_profit,
            Source::RecurringAmount => &self.recurring_amount,
            Source::LeadTimeDays => &self.lead_time_days,
            Source::InventoryTurns => &self.inventory_turns,
            Source::CogsVariancePct => &self.cogs_variance_pct,
        }
    }
}
